//! StorageSession - 1 本のコネクションに束縛された操作群
//!
//! # 設計原則
//! - セッションはバックエンドコネクションを 1 本だけ所有する
//! - どの経路で抜けても（return / `?` / キャンセル / panic）Drop で解放する
//! - 名前検索はコンテナ全件をページングしてクライアント側で絞り込む
//!   （バックエンドに名前一致の取得が無いため。コンテナサイズに比例するコスト）
//! - バックエンド呼び出しはすべて CancellationToken と競合させる

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::expiration;
use crate::domain::{
    ObjectId, RemoteObject, StorageEntryOptions, StorageError, StorageResult,
};
use crate::ports::{BackendError, Clock, ObjectQuery, ObjectStore};

/// Outcome of one sweep over the container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Entries inspected.
    pub scanned: usize,
    /// Entries deleted because they were expired.
    pub evicted: usize,
    /// Entries skipped because their metadata was unreadable or the delete failed.
    pub failed: usize,
}

/// StorageSession はコンテナ内のエントリを操作する
///
/// `SessionFactory::open_session` から取得し、操作が終わったら drop します。
pub struct StorageSession {
    store: Option<Box<dyn ObjectStore>>,
    container_id: ObjectId,
    clock: Arc<dyn Clock>,
}

impl StorageSession {
    pub(crate) fn new(
        store: Box<dyn ObjectStore>,
        container_id: ObjectId,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store: Some(store),
            container_id,
            clock,
        }
    }

    pub fn container_id(&self) -> &ObjectId {
        &self.container_id
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_none()
    }

    /// Decoded policies of every entry named `name`. Empty means absent.
    pub async fn find(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<StorageEntryOptions>> {
        self.lookup(name, cancel)
            .await?
            .iter()
            .map(|entry| expiration::decode(&entry.metadata))
            .collect()
    }

    /// Raw entries named `name`, in backend order.
    pub async fn lookup(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<RemoteObject>> {
        validate_name(name)?;
        let mut entries = self.list_entries(cancel).await?;
        entries.retain(|entry| entry.has_name(name));
        Ok(entries)
    }

    pub async fn create(
        &self,
        name: &str,
        content: &[u8],
        options: &StorageEntryOptions,
        cancel: &CancellationToken,
    ) -> StorageResult<ObjectId> {
        validate_name(name)?;
        let store = self.store()?;
        let metadata = expiration::encode(options);

        let id = race(
            cancel,
            store.create_object(&self.container_id, name, &metadata, content),
        )
        .await?
        .map_err(|source| failed("upload", name, source))?;

        debug!(name, id = %id, bytes = content.len(), "entry created");
        Ok(id)
    }

    /// Overwrite the first entry named `name`.
    pub async fn update(
        &self,
        name: &str,
        content: &[u8],
        options: &StorageEntryOptions,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        let entry = self.resolve(name, cancel).await?;
        let store = self.store()?;
        let metadata = expiration::encode(options);

        race(cancel, store.update_object(&entry.id, &metadata, content))
            .await?
            .map_err(|source| failed("upload", name, source))?;

        debug!(name, id = %entry.id, bytes = content.len(), "entry updated");
        Ok(())
    }

    pub async fn download(&self, name: &str, cancel: &CancellationToken) -> StorageResult<Vec<u8>> {
        let entry = self.resolve(name, cancel).await?;
        let store = self.store()?;

        race(cancel, store.download(&entry.id))
            .await?
            .map_err(|source| failed("download", name, source))
    }

    pub async fn delete(&self, name: &str, cancel: &CancellationToken) -> StorageResult<()> {
        let entry = self.resolve(name, cancel).await?;
        let store = self.store()?;

        race(cancel, store.delete(&entry.id)).await??;
        debug!(name, id = %entry.id, "entry deleted");
        Ok(())
    }

    pub async fn list_ids(&self, cancel: &CancellationToken) -> StorageResult<Vec<ObjectId>> {
        Ok(self
            .list_entries(cancel)
            .await?
            .into_iter()
            .map(|entry| entry.id)
            .collect())
    }

    /// Every entry in the container, following continuation tokens to the end.
    pub async fn list_entries(
        &self,
        cancel: &CancellationToken,
    ) -> StorageResult<Vec<RemoteObject>> {
        let store = self.store()?;
        let query = ObjectQuery::ObjectsIn(self.container_id.clone());

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = race(cancel, store.query(&query, page_token.as_deref())).await??;
            entries.extend(page.objects);
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(entries)
    }

    /// Delete every expired entry.
    ///
    /// # 失敗の扱い
    /// - 一覧取得の失敗は呼び出し側に返す
    /// - 個々のエントリの失敗（メタデータ不正、削除失敗）は warn を出して数えるだけ
    /// - キャンセルされたらエントリ間で止まる（削除済みのものは戻さない）
    pub async fn sweep(&self, cancel: &CancellationToken) -> StorageResult<SweepReport> {
        let entries = self.list_entries(cancel).await?;
        let store = self.store()?;
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for entry in entries {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            report.scanned += 1;

            match expiration::is_expired(entry.last_modified, &entry.metadata, now) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(err) => {
                    warn!(name = %entry.name, id = %entry.id, error = %err, "skipping entry with unreadable expiration");
                    report.failed += 1;
                    continue;
                }
            }

            match race(cancel, store.delete(&entry.id)).await? {
                Ok(()) => {
                    debug!(name = %entry.name, id = %entry.id, "expired entry evicted");
                    report.evicted += 1;
                }
                Err(err) => {
                    warn!(name = %entry.name, id = %entry.id, error = %err, "failed to evict expired entry");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Release the connection. Idempotent; release failures are only logged.
    pub fn dispose(&mut self) {
        if let Some(store) = self.store.take()
            && let Err(err) = store.close()
        {
            warn!(container = %self.container_id, error = %err, "failed to release backend connection");
        }
    }

    fn store(&self) -> StorageResult<&dyn ObjectStore> {
        self.store.as_deref().ok_or(StorageError::SessionClosed)
    }

    async fn resolve(&self, name: &str, cancel: &CancellationToken) -> StorageResult<RemoteObject> {
        self.lookup(name, cancel)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found(name))
    }
}

impl Drop for StorageSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn validate_name(name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::InvalidArgument(
            "entry name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn failed(operation: &'static str, name: &str, source: BackendError) -> StorageError {
    StorageError::FailedOperation {
        operation,
        name: name.to_string(),
        source,
    }
}

/// Run a backend call unless `cancel` fires first.
///
/// The outer result carries cancellation, the inner one the backend outcome,
/// so callers choose how to classify backend failures.
async fn race<T, F>(
    cancel: &CancellationToken,
    call: F,
) -> StorageResult<Result<T, BackendError>>
where
    F: Future<Output = Result<T, BackendError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        outcome = call => Ok(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::fixtures::{Harness, harness};
    use crate::domain::Metadata;
    use crate::ports::Connector;
    use chrono::TimeDelta;

    #[tokio::test]
    async fn empty_name_is_invalid_argument() {
        let Harness { factory, .. } = harness().await;
        let session = factory.open_session().await.unwrap();
        let cancel = CancellationToken::new();

        assert!(matches!(
            session.find("", &cancel).await,
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(matches!(
            session
                .create("", b"v", &StorageEntryOptions::never_expires(), &cancel)
                .await,
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn find_returns_every_entry_with_the_name() {
        let Harness { factory, clock, .. } = harness().await;
        let session = factory.open_session().await.unwrap();
        let cancel = CancellationToken::new();
        let sliding = StorageEntryOptions::never_expires().with_sliding_expiration(TimeDelta::hours(1));
        let absolute =
            StorageEntryOptions::never_expires().with_absolute_expiration(clock.now() + TimeDelta::days(1));

        session.create("dup", b"1", &sliding, &cancel).await.unwrap();
        session.create("dup", b"2", &absolute, &cancel).await.unwrap();
        session.create("other", b"3", &sliding, &cancel).await.unwrap();

        let found = session.find("dup", &cancel).await.unwrap();
        assert_eq!(found, vec![sliding, absolute]);
        assert!(session.find("missing", &cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_targets_the_first_match() {
        let Harness { factory, backend, .. } = harness().await;
        let session = factory.open_session().await.unwrap();
        let cancel = CancellationToken::new();
        let options = StorageEntryOptions::never_expires();

        let first = session.create("dup", b"1", &options, &cancel).await.unwrap();
        let second = session.create("dup", b"2", &options, &cancel).await.unwrap();
        session.update("dup", b"new", &options, &cancel).await.unwrap();

        assert_eq!(backend.object(&first).unwrap().1, b"new");
        assert_eq!(backend.object(&second).unwrap().1, b"2");
    }

    #[tokio::test]
    async fn upload_and_download_failures_are_failed_operation() {
        let Harness { factory, backend, .. } = harness().await;
        let session = factory.open_session().await.unwrap();
        let cancel = CancellationToken::new();
        let options = StorageEntryOptions::never_expires();
        session.create("k", b"v", &options, &cancel).await.unwrap();

        backend.fail_uploads(true);
        let err = session.create("k2", b"v", &options, &cancel).await.unwrap_err();
        assert!(matches!(err, StorageError::FailedOperation { operation: "upload", .. }));
        let err = session.update("k", b"v", &options, &cancel).await.unwrap_err();
        assert!(matches!(err, StorageError::FailedOperation { operation: "upload", .. }));

        backend.fail_downloads(true);
        let err = session.download("k", &cancel).await.unwrap_err();
        assert!(matches!(err, StorageError::FailedOperation { operation: "download", .. }));
    }

    #[tokio::test]
    async fn listing_follows_continuation_tokens() {
        let Harness { factory, .. } = crate::app::fixtures::harness_with_page_size(2).await;
        let session = factory.open_session().await.unwrap();
        let cancel = CancellationToken::new();
        for i in 0..5 {
            session
                .create(&format!("k{i}"), b"v", &StorageEntryOptions::never_expires(), &cancel)
                .await
                .unwrap();
        }

        assert_eq!(session.list_ids(&cancel).await.unwrap().len(), 5);
        assert_eq!(session.download("k4", &cancel).await.unwrap(), b"v");
    }

    #[tokio::test]
    async fn sweep_evicts_only_expired_entries() {
        let Harness { factory, backend, clock } = harness().await;
        let session = factory.open_session().await.unwrap();
        let cancel = CancellationToken::new();
        let now = clock.now();

        session
            .create("stale", b"1", &StorageEntryOptions::expires_after(now, TimeDelta::minutes(1)), &cancel)
            .await
            .unwrap();
        session
            .create(
                "idle",
                b"2",
                &StorageEntryOptions::never_expires().with_sliding_expiration(TimeDelta::minutes(30)),
                &cancel,
            )
            .await
            .unwrap();
        let fresh = session
            .create("fresh", b"3", &StorageEntryOptions::expires_after(now, TimeDelta::days(1)), &cancel)
            .await
            .unwrap();
        session
            .create("forever", b"4", &StorageEntryOptions::never_expires(), &cancel)
            .await
            .unwrap();
        let before = backend.object(&fresh).unwrap();

        clock.advance(TimeDelta::hours(1));
        let report = session.sweep(&cancel).await.unwrap();

        assert_eq!(report, SweepReport { scanned: 4, evicted: 2, failed: 0 });
        let names: Vec<String> = session
            .list_entries(&cancel)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["fresh", "forever"]);
        assert_eq!(backend.object(&fresh).unwrap(), before);
    }

    #[tokio::test]
    async fn sweep_isolates_per_entry_failures() {
        let Harness { factory, backend, clock } = harness().await;
        let session = factory.open_session().await.unwrap();
        let cancel = CancellationToken::new();
        let expiring = StorageEntryOptions::expires_after(clock.now(), TimeDelta::seconds(1));

        let stuck = session.create("stuck", b"1", &expiring, &cancel).await.unwrap();
        session.create("gone", b"2", &expiring, &cancel).await.unwrap();

        // malformed metadata written directly through a raw connection
        let raw = backend.connect().await.unwrap();
        let mut metadata = Metadata::new();
        metadata.insert(expiration::SLIDING_EXPIRATION_KEY.to_string(), "soon".to_string());
        raw.create_object(session.container_id(), "garbled", &metadata, b"3")
            .await
            .unwrap();
        raw.close().unwrap();

        backend.fail_delete_of(stuck.clone());
        clock.advance(TimeDelta::minutes(1));
        let report = session.sweep(&cancel).await.unwrap();

        assert_eq!(report, SweepReport { scanned: 3, evicted: 1, failed: 2 });
        assert!(backend.object(&stuck).is_some());
        assert!(session.find("gone", &cancel).await.unwrap().is_empty());
        assert_eq!(session.lookup("garbled", &cancel).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_fails_loudly_on_malformed_metadata() {
        let Harness { factory, backend, .. } = harness().await;
        let session = factory.open_session().await.unwrap();
        let cancel = CancellationToken::new();

        let raw = backend.connect().await.unwrap();
        let mut metadata = Metadata::new();
        metadata.insert(expiration::ABSOLUTE_EXPIRATION_KEY.to_string(), "tomorrow".to_string());
        raw.create_object(session.container_id(), "k", &metadata, b"v")
            .await
            .unwrap();
        raw.close().unwrap();

        let err = session.find("k", &cancel).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidMetadata { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_stops_operations() {
        let Harness { factory, .. } = harness().await;
        let session = factory.open_session().await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            session.create("k", b"v", &StorageEntryOptions::never_expires(), &cancel).await,
            Err(StorageError::Cancelled)
        ));
        assert!(matches!(session.sweep(&cancel).await, Err(StorageError::Cancelled)));
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_closes_the_session() {
        let Harness { factory, backend, .. } = harness().await;
        let mut session = factory.open_session().await.unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(backend.open_connections(), 1);

        session.dispose();
        session.dispose();

        assert!(session.is_closed());
        assert_eq!(backend.open_connections(), 0);
        assert!(matches!(
            session.list_ids(&cancel).await,
            Err(StorageError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn close_failure_is_swallowed_on_drop() {
        let Harness { factory, backend, .. } = harness().await;
        let session = factory.open_session().await.unwrap();
        backend.fail_close(true);

        drop(session);
        assert_eq!(backend.open_connections(), 0);
    }
}
