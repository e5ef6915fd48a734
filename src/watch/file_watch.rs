use std::path::Path;
use std::sync::Arc;

use notify::Config;
use notify::Event;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::SyncEvent;
use super::SyncState;
use crate::metrics;
use crate::Result;
use crate::TypedStore;

/// Reloads a [`TypedStore`] when its cache file is edited on disk
///
/// The parent directory is watched rather than the file itself because
/// cache writes replace the file through a rename. Content equal to the
/// bridge's own last write is not a local edit and is skipped. Stops when
/// dropped.
pub(crate) struct LocalFileWatcher {
    _watcher: RecommendedWatcher,
}

impl LocalFileWatcher {
    pub(crate) fn spawn(
        state: Arc<SyncState>,
        store: Arc<TypedStore>,
    ) -> Result<Self> {
        let target = store.path().to_path_buf();
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| target.clone());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    if !event.paths.iter().any(|p| p == &target) {
                        return;
                    }

                    let content = match std::fs::read(&target) {
                        Ok(content) => content,
                        Err(e) => {
                            warn!(path = ?target, "cache file unreadable: {}", e);
                            return;
                        }
                    };
                    if !state.note_content(&content) {
                        debug!(path = ?target, kind = ?event.kind, "cache file unchanged since last write");
                        return;
                    }

                    info!(path = ?target, kind = ?event.kind, "cache file edited locally");
                    match store.reload_from_bytes(&content) {
                        Ok(()) => {
                            metrics::record_sync(&state.key, metrics::OUTCOME_LOCAL_RELOAD);
                            state.publish(SyncEvent::LocalReload);
                        }
                        Err(e) => {
                            metrics::record_sync(&state.key, metrics::OUTCOME_PARSE_FAILED);
                            state.publish(SyncEvent::ParseFailed {
                                revision: 0,
                                error: e.to_string(),
                            });
                        }
                    }
                }
                Err(e) => error!("cache file watch error: {:?}", e),
            },
            Config::default(),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(path = ?dir, "local cache watcher started");

        Ok(Self { _watcher: watcher })
    }
}
