//! SweepLoop - 期限切れエントリの定期削除
//!
//! # フロー
//! 1. 初期化から 1 interval 後に最初の sweep
//! 2. 毎回新しいセッションを開いて `StorageSession::sweep()`
//! 3. 失敗は error ログに出してスケジュールは継続
//!
//! 停止は CancellationToken。実行中の sweep の残りのリモート呼び出しも止まる。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::session::SweepReport;
use crate::app::session_factory::SessionSource;
use crate::domain::{StorageError, StorageResult};

/// SweepLoop handle.
/// - `request_shutdown()` でループ全体が止まる
/// - `shutdown_and_join()` で終了を待てる
/// - drop でも止まる（待ちはしない）
pub struct SweepLoop {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl SweepLoop {
    pub(crate) fn spawn(source: Arc<SessionSource>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            sweep_loop(source, period, token).await;
        });

        Self {
            cancel,
            join: Some(join),
        }
    }

    pub fn request_shutdown(&self) {
        self.cancel.cancel();
    }

    pub async fn shutdown_and_join(mut self) {
        self.request_shutdown();
        if let Some(join) = self.join.take()
            && let Err(err) = join.await
        {
            warn!(error = %err, "sweep task ended abnormally");
        }
    }
}

impl Drop for SweepLoop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn sweep_loop(source: Arc<SessionSource>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match sweep_once(&source, &cancel).await {
            Ok(report) => info!(
                scanned = report.scanned,
                evicted = report.evicted,
                failed = report.failed,
                "sweep finished"
            ),
            Err(StorageError::Cancelled) => break,
            Err(err) => error!(error = %err, "sweep failed"),
        }
    }

    debug!("sweep loop stopped");
}

async fn sweep_once(source: &SessionSource, cancel: &CancellationToken) -> StorageResult<SweepReport> {
    let session = source.open().await?;
    session.sweep(cancel).await
}
