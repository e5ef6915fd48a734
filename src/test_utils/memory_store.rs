use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::ChangeEvent;
use crate::ChangeKind;
use crate::ChangeStream;
use crate::Error;
use crate::Fetched;
use crate::RemoteEntry;
use crate::RemoteStore;
use crate::Result;

/// In-memory [`RemoteStore`] with etcd-like revisions and replaying watches
pub(crate) struct MemoryStore {
    inner: Mutex<Inner>,
}

struct Inner {
    revision: i64,
    data: BTreeMap<String, (Vec<u8>, i64)>,
    history: Vec<ChangeEvent>,
    live: broadcast::Sender<ChangeEvent>,
    failing_gets: usize,
    failing_watches: usize,
    watch_calls: Vec<(String, Option<i64>)>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        let (live, _) = broadcast::channel(1024);
        Self {
            inner: Mutex::new(Inner {
                revision: 1,
                data: BTreeMap::new(),
                history: Vec::new(),
                live,
                failing_gets: 0,
                failing_watches: 0,
                watch_calls: Vec::new(),
            }),
        }
    }

    /// Synchronous write, returns the new revision
    pub(crate) fn set(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
    ) -> i64 {
        let mut inner = self.inner.lock();
        inner.revision += 1;
        let revision = inner.revision;
        let version = inner.data.get(key).map(|(_, v)| v + 1).unwrap_or(1);
        inner
            .data
            .insert(key.to_string(), (value.as_ref().to_vec(), version));
        let event = ChangeEvent {
            kind: if version == 1 {
                ChangeKind::Create
            } else {
                ChangeKind::Modify
            },
            key: key.to_string(),
            value: value.as_ref().to_vec(),
            mod_revision: revision,
        };
        inner.history.push(event.clone());
        let _ = inner.live.send(event);
        revision
    }

    pub(crate) fn delete(
        &self,
        key: &str,
    ) -> i64 {
        let mut inner = self.inner.lock();
        inner.revision += 1;
        let revision = inner.revision;
        inner.data.remove(key);
        let event = ChangeEvent {
            kind: ChangeKind::Delete,
            key: key.to_string(),
            value: Vec::new(),
            mod_revision: revision,
        };
        inner.history.push(event.clone());
        let _ = inner.live.send(event);
        revision
    }

    /// End every open watch stream
    pub(crate) fn close_watches(&self) {
        let (live, _) = broadcast::channel(1024);
        self.inner.lock().live = live;
    }

    pub(crate) fn fail_next_gets(
        &self,
        count: usize,
    ) {
        self.inner.lock().failing_gets = count;
    }

    pub(crate) fn fail_next_watches(
        &self,
        count: usize,
    ) {
        self.inner.lock().failing_watches = count;
    }

    /// `(key, start_revision)` of every watch call so far
    pub(crate) fn watch_calls(&self) -> Vec<(String, Option<i64>)> {
        self.inner.lock().watch_calls.clone()
    }

    pub(crate) fn revision(&self) -> i64 {
        self.inner.lock().revision
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Fetched> {
        let mut inner = self.inner.lock();
        if inner.failing_gets > 0 {
            inner.failing_gets -= 1;
            return Err(Error::Timeout {
                operation: "get",
                duration: Duration::from_millis(1),
            });
        }
        Ok(Fetched {
            value: inner.data.get(key).map(|(v, _)| v.clone()).unwrap_or_default(),
            revision: inner.revision,
        })
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        _timeout: Duration,
    ) -> Result<i64> {
        Ok(self.set(key, value))
    }

    async fn watch(
        &self,
        key: &str,
        start_revision: Option<i64>,
    ) -> Result<ChangeStream> {
        let mut inner = self.inner.lock();
        inner.watch_calls.push((key.to_string(), start_revision));
        if inner.failing_watches > 0 {
            inner.failing_watches -= 1;
            return Err(Error::Timeout {
                operation: "watch",
                duration: Duration::from_millis(1),
            });
        }

        let rx = inner.live.subscribe();
        let replay: Vec<ChangeEvent> = match start_revision {
            Some(start) => inner
                .history
                .iter()
                .filter(|e| e.key == key && e.mod_revision >= start)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let replayed_up_to = inner.revision;
        drop(inner);

        let key = key.to_string();
        let live = stream::unfold(rx, move |mut rx| {
            let key = key.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) if event.key == key && event.mod_revision > replayed_up_to => {
                            return Some((Ok(vec![event]), rx));
                        }
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        let replay = stream::iter(replay.into_iter().map(|event| Ok(vec![event])));
        Ok(replay.chain(live).boxed())
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<RemoteEntry>> {
        let inner = self.inner.lock();
        Ok(inner
            .data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, (v, _))| RemoteEntry {
                key: k.clone(),
                value: v.clone(),
            })
            .collect())
    }
}
