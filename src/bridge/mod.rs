//! Configuration handle
//!
//! [`ConfigBridge`] couples one remote key (`prefix/group/format`) with its
//! local cache file and typed view. Typical lifecycle:
//!
//! ```rust,ignore
//! use hub_config::{BridgeConfig, ConfigBridge, ConfigFormat};
//!
//! let config = BridgeConfig::new(vec!["http://127.0.0.1:2379".into()], "test", ConfigFormat::Json);
//! let bridge = ConfigBridge::connect(config).await?;
//! bridge.start().await?;
//!
//! let name = bridge.settings()?.get_string("service.name");
//! bridge.put(r#"{"service":{"name":"billing"}}"#, None, None).await?;
//!
//! bridge.shutdown().await;
//! ```


use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::discovery::group_by_service;
use crate::watch::LocalFileWatcher;
use crate::watch::SyncState;
use crate::watch::WatchLoop;
use crate::BridgeConfig;
use crate::CacheWriter;
use crate::ConfigFormat;
use crate::Error;
use crate::EtcdStore;
use crate::RemoteKey;
use crate::RemoteStore;
use crate::Result;
use crate::SyncEvent;
use crate::TypedStore;

/// Handle for one synchronized configuration blob
///
/// Created once per (group, format) pair. The remote key is fixed for the
/// handle's lifetime; writing to another group or format through
/// [`put`](ConfigBridge::put) never retargets the watch.
pub struct ConfigBridge {
    config: BridgeConfig,
    key: RemoteKey,
    state: Arc<SyncState>,
    store: OnceLock<Arc<TypedStore>>,
    started: AtomicBool,
    /// Serializes puts issued through this handle
    put_lock: tokio::sync::Mutex<()>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    _file_watcher: Option<LocalFileWatcher>,
}

impl ConfigBridge {
    /// Connect to the remote store described by `config`
    ///
    /// # Errors
    /// - [`Error::InvalidConfig`] for unusable settings
    /// - [`Error::Connection`] / [`Error::Timeout`] when no endpoint is reachable
    pub async fn connect(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let remote = EtcdStore::connect(&config).await?;
        Self::with_store(config, Arc::new(remote))
    }

    /// Build a handle on top of an existing [`RemoteStore`]
    pub fn with_store(
        config: BridgeConfig,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self> {
        config.validate()?;

        let key = RemoteKey::new(&config.prefix, &config.group, config.format);
        let (events, _) = broadcast::channel(config.event_buffer);
        let state = Arc::new(SyncState {
            key: key.to_string(),
            remote,
            cache: CacheWriter::new(&config.cache_root, &key),
            cache_lock: RwLock::new(()),
            revision: AtomicI64::new(0),
            events,
            last_content: Mutex::new(Vec::new()),
        });

        Ok(Self {
            config,
            key,
            state,
            store: OnceLock::new(),
            started: AtomicBool::new(false),
            put_lock: tokio::sync::Mutex::new(()),
            worker: Mutex::new(None),
        })
    }

    /// Fetch the current value, write the cache, build the typed view and
    /// start watching the remote key
    ///
    /// An absent key or a failed initial fetch degrades to the format's
    /// empty document so the typed view is still usable.
    ///
    /// A handle whose watch loop gave up (see [`SyncEvent::Closed`]) can be
    /// started again without calling [`shutdown`](ConfigBridge::shutdown).
    ///
    /// # Errors
    /// - [`Error::AlreadyStarted`] while the watch loop is running
    /// - [`Error::Io`] when the cache directory or file cannot be written
    /// - [`Error::Parse`] when the fetched document is malformed
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) && !self.reap_finished_worker() {
            return Err(Error::AlreadyStarted);
        }

        let result = self.start_inner().await;
        if result.is_err() {
            self.started.store(false, Ordering::Release);
        }
        result
    }

    /// Drop a worker whose watch loop already exited
    fn reap_finished_worker(&self) -> bool {
        let mut worker = self.worker.lock();
        match worker.as_ref() {
            Some(w) if w.handle.is_finished() => {
                info!(key = %self.key, "restarting after the watch loop exited");
                *worker = None;
                true
            }
            _ => false,
        }
    }

    async fn start_inner(&self) -> Result<()> {
        let format = self.key.format();
        self.state.cache.prepare().await?;

        let (content, revision) = match self.state.remote.get(&self.state.key).await {
            Ok(fetched) if !fetched.value.is_empty() => (fetched.value, fetched.revision),
            Ok(fetched) => {
                info!(key = %self.key, "remote key absent, caching empty document");
                (format.empty_document().to_vec(), fetched.revision)
            }
            Err(e) => {
                warn!(key = %self.key, "initial fetch failed, caching empty document: {}", e);
                (format.empty_document().to_vec(), 0)
            }
        };

        {
            let _guard = self.state.cache_lock.write().await;
            self.state.note_content(&content);
            self.state.cache.write(&content).await?;
        }

        let store = match self.store.get() {
            Some(store) => {
                store.reload_from_bytes(&content)?;
                store.clone()
            }
            None => {
                let store = Arc::new(TypedStore::from_bytes(
                    self.state.cache.path(),
                    format,
                    &content,
                )?);
                self.store.get_or_init(|| store).clone()
            }
        };
        self.state.advance_revision(revision);

        let file_watcher = if self.config.watch_local_file {
            Some(LocalFileWatcher::spawn(self.state.clone(), store.clone())?)
        } else {
            None
        };

        let cancel = CancellationToken::new();
        let watch_loop = WatchLoop::new(
            self.state.clone(),
            store,
            self.config.watch_retry,
            cancel.clone(),
        );
        let handle = tokio::spawn(watch_loop.run());

        *self.worker.lock() = Some(Worker {
            cancel,
            handle,
            _file_watcher: file_watcher,
        });

        info!(key = %self.key, path = ?self.state.cache.path(), revision, "configuration bridge started");
        Ok(())
    }

    /// Read the remote value directly, bypassing the cache
    ///
    /// An absent key yields an empty payload.
    pub async fn fetch(&self) -> Result<Vec<u8>> {
        Ok(self.state.remote.get(&self.state.key).await?.value)
    }

    /// Write `value` to this handle's key, or to a sibling key when `group`
    /// or `format` is given
    ///
    /// The cache is not touched here; it follows once the watch delivers the
    /// change. Writes to a sibling key are never observed by this handle.
    ///
    /// # Returns
    /// Revision created by the write
    pub async fn put(
        &self,
        value: impl Into<Vec<u8>>,
        group: Option<&str>,
        format: Option<ConfigFormat>,
    ) -> Result<i64> {
        let _guard = self.put_lock.lock().await;

        let target = self.key.sibling(group, format);
        if target != self.key {
            debug!(target = %target, watched = %self.key, "put to sibling key");
        }

        self.state
            .remote
            .put(&target.to_string(), value.into(), self.config.put_timeout())
            .await
    }

    /// Scan the key prefix and group registered values by service name
    pub async fn discover_services(&self) -> Result<HashMap<String, Vec<String>>> {
        let entries = self.state.remote.scan_prefix(self.key.prefix()).await?;
        Ok(group_by_service(entries))
    }

    /// Typed view of the cache
    ///
    /// # Errors
    /// [`Error::NotStarted`] before [`start`](ConfigBridge::start) succeeded
    pub fn settings(&self) -> Result<&TypedStore> {
        self.store
            .get()
            .map(|store| store.as_ref())
            .ok_or(Error::NotStarted)
    }

    /// Receive cache synchronization outcomes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.state.events.subscribe()
    }

    /// Current content of the cache file
    pub async fn cached_content(&self) -> Result<Vec<u8>> {
        let _guard = self.state.cache_lock.read().await;
        self.state.cache.read().await
    }

    pub fn key(&self) -> &RemoteKey {
        &self.key
    }

    pub fn cache_path(&self) -> &Path {
        self.state.cache.path()
    }

    /// Highest remote revision reflected in the cache
    pub fn last_revision(&self) -> i64 {
        self.state.revision()
    }

    /// Whether the watch loop is still running
    pub fn is_watching(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|w| !w.handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the watch loop and wait for it to finish
    ///
    /// The cache file and typed view keep their last content.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                warn!(key = %self.key, "watch task ended abnormally: {:?}", e);
            }
            self.started.store(false, Ordering::Release);
            info!(key = %self.key, "configuration bridge stopped");
        }
    }
}

impl Drop for ConfigBridge {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}
