//! StorageConfig - ストレージの設定
//!
//! serde で読み込める素の struct です。どこから読むか（環境変数、.env、
//! ファイル）はバイナリ側の責務で、ここでは既定値と検証だけを持ちます。

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::domain::{StorageError, StorageResult};

pub const DEFAULT_STORAGE_NAME: &str = "stowage";
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// StorageConfig はバックエンド接続とコンテナの設定
///
/// # フィールド
/// - `credential`: バックエンドの認証情報（Drive では OAuth アクセストークン）
/// - `application_name`: バックエンドに名乗るアプリ名
/// - `storage_name`: コンテナ（フォルダ）名
/// - `share_to`: コンテナ作成時に writer 権限を付与する相手（任意）
/// - `sweep_interval`: 期限切れ掃除の間隔（`sweep_interval_secs` で秒指定）
#[derive(Clone, Deserialize)]
pub struct StorageConfig {
    pub credential: String,
    pub application_name: String,
    #[serde(default = "default_storage_name")]
    pub storage_name: String,
    #[serde(default)]
    pub share_to: Option<String>,
    #[serde(
        rename = "sweep_interval_secs",
        default = "default_sweep_interval",
        deserialize_with = "duration_from_secs"
    )]
    pub sweep_interval: Duration,
}

fn default_storage_name() -> String {
    DEFAULT_STORAGE_NAME.to_string()
}

fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl StorageConfig {
    pub fn new(credential: impl Into<String>, application_name: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            application_name: application_name.into(),
            storage_name: default_storage_name(),
            share_to: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_storage_name(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = storage_name.into();
        self
    }

    pub fn with_share_to(mut self, principal: impl Into<String>) -> Self {
        self.share_to = Some(principal.into());
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// 起動時検証（Fail-fast）
    pub fn validate(&self) -> StorageResult<()> {
        if self.storage_name.trim().is_empty() {
            return Err(StorageError::InvalidArgument(
                "storage_name must not be empty".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(StorageError::InvalidArgument(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        if self.share_to.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(StorageError::InvalidArgument(
                "share_to must not be blank when set".to_string(),
            ));
        }
        Ok(())
    }
}

// credential はログに出さない
impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("credential", &"<redacted>")
            .field("application_name", &self.application_name)
            .field("storage_name", &self.storage_name)
            .field("share_to", &self.share_to)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}
