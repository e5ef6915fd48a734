//! Watch loop keeping the cache in sync with the remote key
//!
//! # Flow
//!
//! ```text
//! remote watch stream -> create/modify event -> cache file write -> TypedStore reload
//!                                                      |                  |
//!                                                      +--> SyncEvent <---+
//! ```
//!
//! # Error Handling
//!
//! - Write and parse failures never stop the loop; they are logged, counted
//!   and published on the sync event channel. The typed view keeps the
//!   last-known-good document.
//! - A broken stream is re-established with exponential backoff after
//!   re-reading the key, so changes made while disconnected are not lost.
//! - When retries are exhausted the loop publishes [`SyncEvent::Closed`] and
//!   exits; the cache keeps its last content.

mod event;
mod file_watch;

pub use event::*;
pub(crate) use file_watch::LocalFileWatcher;


use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::metrics;
use crate::CacheWriter;
use crate::ChangeEvent;
use crate::RemoteStore;
use crate::Result;
use crate::TypedStore;
use crate::WatchRetryPolicy;

/// State shared between a bridge handle and its watch loop
pub(crate) struct SyncState {
    pub(crate) key: String,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) cache: CacheWriter,
    /// Serializes cache file access
    pub(crate) cache_lock: RwLock<()>,
    /// Highest remote revision reflected in the cache
    pub(crate) revision: AtomicI64,
    pub(crate) events: broadcast::Sender<SyncEvent>,
    /// Latest cache content written or observed, used to tell local edits
    /// apart from the bridge's own writes
    pub(crate) last_content: Mutex<Vec<u8>>,
}

impl SyncState {
    pub(crate) fn revision(&self) -> i64 {
        self.revision.load(Ordering::Acquire)
    }

    pub(crate) fn advance_revision(
        &self,
        revision: i64,
    ) {
        self.revision.fetch_max(revision, Ordering::AcqRel);
    }

    /// Record `content` as the latest cache content
    ///
    /// Returns `false` when it already was.
    pub(crate) fn note_content(
        &self,
        content: &[u8],
    ) -> bool {
        let mut last = self.last_content.lock();
        if last.as_slice() == content {
            return false;
        }
        *last = content.to_vec();
        true
    }

    pub(crate) fn publish(
        &self,
        event: SyncEvent,
    ) {
        // No subscriber is not an error
        let _ = self.events.send(event);
    }

    /// Write `content` to the cache and refresh `store` from the same bytes
    pub(crate) async fn apply(
        &self,
        store: &TypedStore,
        content: &[u8],
        revision: i64,
    ) {
        let _guard = self.cache_lock.write().await;

        self.note_content(content);
        if let Err(e) = self.cache.write(content).await {
            warn!(key = %self.key, revision, "cache write failed: {}", e);
            metrics::record_sync(&self.key, metrics::OUTCOME_WRITE_FAILED);
            self.publish(SyncEvent::WriteFailed {
                revision,
                error: e.to_string(),
            });
            return;
        }
        self.advance_revision(revision);

        match store.reload_from_bytes(content) {
            Ok(()) => {
                debug!(key = %self.key, revision, "cache synchronized");
                metrics::record_sync(&self.key, metrics::OUTCOME_APPLIED);
                self.publish(SyncEvent::Applied {
                    revision,
                    bytes: content.len(),
                });
            }
            Err(e) => {
                metrics::record_sync(&self.key, metrics::OUTCOME_PARSE_FAILED);
                self.publish(SyncEvent::ParseFailed {
                    revision,
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Background task subscribed to one remote key
pub(crate) struct WatchLoop {
    state: Arc<SyncState>,
    store: Arc<TypedStore>,
    retry: WatchRetryPolicy,
    cancel: CancellationToken,
}

impl WatchLoop {
    pub(crate) fn new(
        state: Arc<SyncState>,
        store: Arc<TypedStore>,
        retry: WatchRetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            store,
            retry,
            cancel,
        }
    }

    pub(crate) async fn run(self) {
        let key = self.state.key.clone();
        let mut attempt = 0usize;
        let mut resubscribing = false;
        // Nothing known about the remote yet, read before subscribing
        let mut needs_resync = self.state.revision() <= 0;

        info!(%key, revision = self.state.revision(), "watch loop started");

        loop {
            if needs_resync {
                if let Err(e) = self.resync().await {
                    warn!(%key, "resync failed: {}", e);
                    if !self.backoff(&mut attempt, e.to_string()).await {
                        return;
                    }
                    continue;
                }
                needs_resync = false;
            }

            let known_revision = self.state.revision();
            let start_revision = (known_revision > 0).then_some(known_revision + 1);
            let subscribed = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(%key, "watch loop cancelled");
                    return;
                }
                result = self.state.remote.watch(&key, start_revision) => result,
            };

            let mut stream = match subscribed {
                Ok(stream) => {
                    attempt = 0;
                    stream
                }
                Err(e) => {
                    warn!(%key, "watch subscription failed: {}", e);
                    resubscribing = true;
                    needs_resync = true;
                    if !self.backoff(&mut attempt, e.to_string()).await {
                        return;
                    }
                    continue;
                }
            };

            if resubscribing {
                info!(%key, known_revision, "watch re-established");
                metrics::record_resubscribe();
                self.state.publish(SyncEvent::Resubscribed {
                    revision: known_revision,
                });
                resubscribing = false;
            }

            let reason = loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!(%key, "watch loop cancelled");
                        return;
                    }
                    item = stream.next() => match item {
                        Some(Ok(batch)) => self.apply_batch(batch).await,
                        Some(Err(e)) => break e.to_string(),
                        None => break "watch stream closed".to_string(),
                    }
                }
            };

            warn!(%key, "watch interrupted: {}", reason);
            resubscribing = true;
            needs_resync = true;
            if !self.backoff(&mut attempt, reason).await {
                return;
            }
        }
    }

    async fn apply_batch(
        &self,
        batch: Vec<ChangeEvent>,
    ) {
        for event in batch {
            if event.key != self.state.key {
                continue;
            }
            if !event.is_actionable() {
                debug!(key = %event.key, kind = ?event.kind, "ignoring watch event");
                continue;
            }
            self.state
                .apply(&self.store, &event.value, event.mod_revision)
                .await;
        }
    }

    /// Catch up with changes missed while the stream was down
    async fn resync(&self) -> Result<()> {
        let fetched = self.state.remote.get(&self.state.key).await?;
        if fetched.revision <= self.state.revision() {
            return Ok(());
        }

        let cached = {
            let _guard = self.state.cache_lock.read().await;
            self.state.cache.read().await.ok()
        };

        if fetched.value.is_empty() || cached.as_deref() == Some(fetched.value.as_slice()) {
            self.state.advance_revision(fetched.revision);
        } else {
            self.state
                .apply(&self.store, &fetched.value, fetched.revision)
                .await;
        }
        Ok(())
    }

    /// Sleep before the next attempt; `false` when the loop should stop
    async fn backoff(
        &self,
        attempt: &mut usize,
        reason: String,
    ) -> bool {
        *attempt += 1;
        if *attempt > self.retry.max_retries {
            error!(
                key = %self.state.key,
                retries = self.retry.max_retries,
                "watch abandoned: {}",
                reason
            );
            self.state.publish(SyncEvent::Closed { reason });
            return false;
        }

        let delay = self.retry.delay_for(*attempt);
        debug!(key = %self.state.key, attempt = *attempt, ?delay, "retrying watch");
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }
}
