//! Shared components for unit tests
mod memory_store;

pub(crate) use memory_store::*;

use std::path::Path;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::BridgeConfig;
use crate::ConfigFormat;
use crate::SyncEvent;
use crate::WatchRetryPolicy;

/// Settings pointing at a temporary cache root with fast retries
pub(crate) fn test_config(
    root: &Path,
    group: &str,
    format: ConfigFormat,
) -> BridgeConfig {
    BridgeConfig::new(vec!["http://127.0.0.1:2379".into()], group, format)
        .with_cache_root(root)
        .with_watch_retry(WatchRetryPolicy {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        })
}

/// Wait until an event matching `pred` arrives, skipping others
pub(crate) async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<SyncEvent>,
    mut pred: F,
) -> SyncEvent
where
    F: FnMut(&SyncEvent) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("sync event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for sync event")
}
