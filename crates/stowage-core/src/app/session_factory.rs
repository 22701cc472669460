//! SessionFactory - コンテナの解決とセッションの払い出し
//!
//! # 学習ポイント
//! - コンストラクタで初期化を完了させる（「未初期化」状態を型で排除）
//! - バックグラウンドタスク（SweepLoop）の所有と停止
//! - 参照循環を避けるため、ループには内側の `SessionSource` だけを渡す

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::config::StorageConfig;
use crate::app::session::{StorageSession, SweepReport};
use crate::app::sweep_loop::SweepLoop;
use crate::domain::{ObjectId, StorageResult};
use crate::ports::{AccessRole, Clock, Connector, ObjectQuery, ObjectStore};

/// Everything needed to open a session. Shared with the sweep loop.
pub(crate) struct SessionSource {
    connector: Arc<dyn Connector>,
    container_id: ObjectId,
    clock: Arc<dyn Clock>,
}

impl SessionSource {
    pub(crate) async fn open(&self) -> StorageResult<StorageSession> {
        let store = self.connector.connect().await?;
        Ok(StorageSession::new(
            store,
            self.container_id.clone(),
            Arc::clone(&self.clock),
        ))
    }
}

/// SessionFactory はプロセスに 1 つ
///
/// # ライフサイクル
/// 1. `initialize()`: コンテナを探す（無ければ作って共有する）→ sweep ループ起動
/// 2. `open_session()`: 操作ごとに新しいコネクションでセッションを作る
/// 3. `shutdown()` または drop: sweep ループを止める
///
/// コンテナ ID は初期化後は変わらない。
pub struct SessionFactory {
    source: Arc<SessionSource>,
    sweeper: Mutex<Option<SweepLoop>>,
}

impl SessionFactory {
    /// Resolve (or create) the container and start the periodic sweep.
    ///
    /// Failing to share a newly created container is logged and ignored.
    /// Every other failure aborts initialization.
    pub async fn initialize(
        connector: Arc<dyn Connector>,
        config: &StorageConfig,
        clock: Arc<dyn Clock>,
    ) -> StorageResult<Arc<Self>> {
        config.validate()?;

        let store = InitConnection(connector.connect().await?);
        let container_id = resolve_container(store.0.as_ref(), config).await?;
        drop(store);

        let source = Arc::new(SessionSource {
            connector,
            container_id,
            clock,
        });
        let sweeper = SweepLoop::spawn(Arc::clone(&source), config.sweep_interval);

        Ok(Arc::new(Self {
            source,
            sweeper: Mutex::new(Some(sweeper)),
        }))
    }

    pub fn container_id(&self) -> &ObjectId {
        &self.source.container_id
    }

    /// A fresh session on its own connection.
    pub async fn open_session(&self) -> StorageResult<StorageSession> {
        self.source.open().await
    }

    /// Run one sweep now, outside the schedule.
    pub async fn sweep_now(&self, cancel: &CancellationToken) -> StorageResult<SweepReport> {
        let session = self.open_session().await?;
        session.sweep(cancel).await
    }

    /// Stop the sweep schedule and wait for it. Later calls do nothing.
    pub async fn shutdown(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.shutdown_and_join().await;
        }
    }
}

/// Releases the connection used during `initialize`, even when the
/// initializing future is dropped mid-flight.
struct InitConnection(Box<dyn ObjectStore>);

impl Drop for InitConnection {
    fn drop(&mut self) {
        if let Err(err) = self.0.close() {
            warn!(error = %err, "failed to release initialization connection");
        }
    }
}

async fn resolve_container(
    store: &dyn ObjectStore,
    config: &StorageConfig,
) -> StorageResult<ObjectId> {
    let mut page_token: Option<String> = None;
    loop {
        let page = store
            .query(&ObjectQuery::ContainersUnderRoot, page_token.as_deref())
            .await?;
        if let Some(existing) = page
            .objects
            .into_iter()
            .find(|object| object.has_name(&config.storage_name))
        {
            info!(storage = %config.storage_name, container = %existing.id, "using existing container");
            return Ok(existing.id);
        }
        match page.next_page_token {
            Some(next) => page_token = Some(next),
            None => break,
        }
    }

    let container_id = store.create_container(&config.storage_name).await?;
    info!(storage = %config.storage_name, container = %container_id, "created container");

    if let Some(principal) = config.share_to.as_deref() {
        match store
            .grant_access(&container_id, principal, AccessRole::Writer)
            .await
        {
            Ok(()) => info!(container = %container_id, principal, "shared container"),
            Err(err) => {
                warn!(container = %container_id, principal, error = %err, "failed to share container")
            }
        }
    }

    Ok(container_id)
}
