//! ObjectStore port - リモートのドキュメント型オブジェクトストア
//!
//! バックエンドが提供するのは次の 2 種類の操作だけです:
//! - 属性によるクエリ（ページング付き）
//! - ID による CRUD
//!
//! 名前による直接取得も compare-and-swap も無いので、キー検索は
//! すべて「コンテナ内を全件クエリ → クライアント側で名前一致フィルタ」になります。
//!
//! # 実装
//! - `impls::InMemoryObjectStore`（開発・テスト用）
//! - `stowage-drive` クレートの DriveConnection（本番用）

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Metadata, ObjectId, RemoteObject};

/// BackendError はバックエンド呼び出しの失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request never got a response (DNS, TLS, connection reset, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials were rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {code}: {message}")]
    Status { code: u16, message: String },

    /// The backend answered but the body could not be understood.
    #[error("malformed backend response: {0}")]
    Decode(String),

    /// The connection was already closed.
    #[error("connection is closed")]
    Closed,

    /// Failure injected by a test backend.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Query predicates the backend can evaluate.
///
/// The predicate language cannot express exact name equality usefully, so
/// callers filter by name on their side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectQuery {
    /// Folder-like containers directly under the account root.
    ContainersUnderRoot,
    /// Non-container objects directly under the given container.
    ObjectsIn(ObjectId),
}

/// One page of query results.
///
/// `next_page_token == None` means this was the last page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<RemoteObject>,
    pub next_page_token: Option<String>,
}

/// Roles that can be granted on a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRole {
    Reader,
    Writer,
}

impl AccessRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessRole::Reader => "reader",
            AccessRole::Writer => "writer",
        }
    }
}

/// ObjectStore は 1 本のバックエンドコネクション
///
/// # 設計原則
/// - コネクションはセッションが 1 本だけ所有する（共有しない）
/// - `close()` は同期。Drop から呼ばれるため await できない
/// - リトライはしない（上位にも無い）
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Run one page of a query. Pass the previous page's token to continue.
    async fn query(
        &self,
        query: &ObjectQuery,
        page_token: Option<&str>,
    ) -> Result<ObjectPage, BackendError>;

    /// Create a folder-like container under the account root.
    async fn create_container(&self, name: &str) -> Result<ObjectId, BackendError>;

    /// Upload a new object into `container`.
    async fn create_object(
        &self,
        container: &ObjectId,
        name: &str,
        metadata: &Metadata,
        content: &[u8],
    ) -> Result<ObjectId, BackendError>;

    /// Replace the metadata and content of an existing object.
    async fn update_object(
        &self,
        id: &ObjectId,
        metadata: &Metadata,
        content: &[u8],
    ) -> Result<(), BackendError>;

    async fn download(&self, id: &ObjectId) -> Result<Vec<u8>, BackendError>;

    async fn delete(&self, id: &ObjectId) -> Result<(), BackendError>;

    /// Grant `principal` a role on a container.
    async fn grant_access(
        &self,
        container: &ObjectId,
        principal: &str,
        role: AccessRole,
    ) -> Result<(), BackendError>;

    /// Release the connection. Must tolerate being called more than once.
    fn close(&self) -> Result<(), BackendError>;
}
