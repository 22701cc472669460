//! DistributedStorage - キー/値 API
//!
//! 各操作は自分専用のセッションを開き、戻る前に閉じます。
//!
//! # 既知の制約
//! `set` は「find → update or create」で、アトミックではありません。
//! 同じキーへの並行 `set` は重複エントリか lost update を起こし得ます。
//! 重複した場合、読み取りはバックエンドが最初に返した方を使います。

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::app::session_factory::SessionFactory;
use crate::domain::{StorageEntryOptions, StorageResult};

/// DistributedStorage は TTL 付きの永続 key/value ストア
#[derive(Clone)]
pub struct DistributedStorage {
    factory: Arc<SessionFactory>,
}

impl DistributedStorage {
    pub fn new(factory: Arc<SessionFactory>) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &Arc<SessionFactory> {
        &self.factory
    }

    pub async fn get(&self, id: &str, cancel: &CancellationToken) -> StorageResult<Vec<u8>> {
        let session = self.factory.open_session().await?;
        session.download(id, cancel).await
    }

    pub async fn get_json<T>(&self, id: &str, cancel: &CancellationToken) -> StorageResult<T>
    where
        T: DeserializeOwned,
    {
        let bytes = self.get(id, cancel).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Create or overwrite `id`.
    pub async fn set(
        &self,
        id: &str,
        value: &[u8],
        options: &StorageEntryOptions,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        let session = self.factory.open_session().await?;
        // existence only; metadata is rewritten either way
        if session.lookup(id, cancel).await?.is_empty() {
            session.create(id, value, options, cancel).await?;
        } else {
            session.update(id, value, options, cancel).await?;
        }
        debug!(key = id, bytes = value.len(), "stored");
        Ok(())
    }

    pub async fn set_json<T>(
        &self,
        id: &str,
        value: &T,
        options: &StorageEntryOptions,
        cancel: &CancellationToken,
    ) -> StorageResult<()>
    where
        T: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(value)?;
        self.set(id, &bytes, options, cancel).await
    }

    pub async fn remove(&self, id: &str, cancel: &CancellationToken) -> StorageResult<()> {
        let session = self.factory.open_session().await?;
        session.delete(id, cancel).await
    }
}
