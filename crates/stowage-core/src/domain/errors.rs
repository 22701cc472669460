//! Errors - エラー型と分類
//!
//! ストレージ操作はすべて [`StorageError`] を返します。
//! 呼び出し側に見える分類は InvalidArgument / NotFound / FailedOperation と、
//! それ以外のバックエンドエラー（認証・ネットワーク）です。

use thiserror::Error;

use crate::ports::BackendError;

/// Alias for `Result<T, StorageError>`.
pub type StorageResult<T> = Result<T, StorageError>;

/// StorageError はストレージ層のエラー
///
/// # 伝播ポリシー
/// - すべて呼び出し側に返す（リトライはしない）
/// - 例外は 2 つだけ: コンテナ作成時の共有付与失敗と、sweep の個別削除失敗
///   （どちらもログに出して握りつぶす）
#[derive(Debug, Error)]
pub enum StorageError {
    /// Caller passed an empty name. Always a caller bug.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No entry with this name exists in the container.
    #[error("entry not found: {name}")]
    NotFound { name: String },

    /// The backend reported that an upload or download did not complete.
    #[error("{operation} failed for {name}: {source}")]
    FailedOperation {
        operation: &'static str,
        name: String,
        #[source]
        source: BackendError,
    },

    /// Transport, authentication or other backend failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Stored expiration metadata could not be parsed.
    #[error("invalid metadata {key}={value:?}: {reason}")]
    InvalidMetadata {
        key: String,
        value: String,
        reason: String,
    },

    /// Structured value (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The caller's cancellation token fired before the backend call finished.
    #[error("operation cancelled")]
    Cancelled,

    /// The session's connection has already been released.
    #[error("session is closed")]
    SessionClosed,
}

impl StorageError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
