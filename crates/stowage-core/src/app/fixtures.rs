//! Shared test wiring: in-memory backend, fixed clock, initialized factory.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::app::{SessionFactory, StorageConfig};
use crate::impls::InMemoryConnector;
use crate::ports::FixedClock;

pub(crate) struct Harness {
    pub(crate) factory: Arc<SessionFactory>,
    pub(crate) backend: InMemoryConnector,
    pub(crate) clock: FixedClock,
}

pub(crate) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub(crate) fn short_interval() -> Duration {
    Duration::from_secs(60)
}

pub(crate) fn config() -> StorageConfig {
    StorageConfig::new("test-token", "stowage-tests").with_sweep_interval(short_interval())
}

pub(crate) async fn harness() -> Harness {
    harness_with(config()).await
}

pub(crate) async fn harness_with(config: StorageConfig) -> Harness {
    let clock = FixedClock::new(start());
    build(InMemoryConnector::new(Arc::new(clock.clone())), clock, config).await
}

pub(crate) async fn harness_with_page_size(page_size: usize) -> Harness {
    let clock = FixedClock::new(start());
    let backend = InMemoryConnector::with_page_size(Arc::new(clock.clone()), page_size);
    build(backend, clock, config()).await
}

async fn build(backend: InMemoryConnector, clock: FixedClock, config: StorageConfig) -> Harness {
    let factory = SessionFactory::initialize(
        Arc::new(backend.clone()),
        &config,
        Arc::new(clock.clone()),
    )
    .await
    .unwrap();
    Harness {
        factory,
        backend,
        clock,
    }
}
