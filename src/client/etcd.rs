use std::time::Duration;

use async_trait::async_trait;
use etcd_client::Client;
use etcd_client::ConnectOptions;
use etcd_client::EventType;
use etcd_client::GetOptions;
use etcd_client::WatchOptions;
use etcd_client::WatchResponse;
use futures::stream;
use futures::StreamExt;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ChangeEvent;
use super::ChangeKind;
use super::ChangeStream;
use super::Fetched;
use super::RemoteEntry;
use super::RemoteStore;
use crate::BridgeConfig;
use crate::Error;
use crate::Result;

/// etcd v3 backed [`RemoteStore`]
///
/// Cloning is cheap; clones share the underlying gRPC channel.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Open a client and make sure at least one endpoint answers
    ///
    /// The whole dial, including authentication and a status check, is
    /// bounded by `dial_timeout_ms`.
    ///
    /// # Errors
    /// - [`Error::Connection`] when no endpoint accepts the connection
    /// - [`Error::Timeout`] when the dial window elapses
    pub async fn connect(config: &BridgeConfig) -> Result<Self> {
        let mut options = ConnectOptions::new()
            .with_connect_timeout(config.dial_timeout())
            .with_keep_alive(config.keep_alive_interval(), config.keep_alive_timeout());
        if let Some((user, password)) = config.credentials() {
            options = options.with_user(user, password);
        }

        let endpoints = config.endpoints.clone();
        let dial = async {
            let mut client = Client::connect(&endpoints, Some(options)).await?;
            client.status().await?;
            Ok::<_, etcd_client::Error>(client)
        };

        match timeout(config.dial_timeout(), dial).await {
            Ok(Ok(client)) => {
                info!(?endpoints, "connected to etcd");
                Ok(Self { client })
            }
            Ok(Err(e)) => {
                error!(?endpoints, "failed to connect to etcd: {:?}", e);
                Err(Error::Connection {
                    endpoints,
                    source: Box::new(e),
                })
            }
            Err(_) => {
                error!(?endpoints, "etcd dial timed out");
                Err(Error::Timeout {
                    operation: "connect",
                    duration: config.dial_timeout(),
                })
            }
        }
    }

    /// Wrap an already connected client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteStore for EtcdStore {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Fetched> {
        let mut client = self.client.clone();
        let response = client.get(key, None).await.map_err(|e| {
            error!(key, "get failed: {:?}", e);
            Error::remote("get", e)
        })?;

        let revision = response.header().map(|h| h.revision()).unwrap_or_default();
        let value = response
            .kvs()
            .first()
            .map(|kv| kv.value().to_vec())
            .unwrap_or_default();
        debug!(key, revision, len = value.len(), "get");
        Ok(Fetched { value, revision })
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        duration: Duration,
    ) -> Result<i64> {
        let mut client = self.client.clone();
        match timeout(duration, client.put(key, value, None)).await {
            Ok(Ok(response)) => {
                let revision = response.header().map(|h| h.revision()).unwrap_or_default();
                debug!(key, revision, "put");
                Ok(revision)
            }
            Ok(Err(e)) => {
                error!(key, "put failed: {:?}", e);
                Err(Error::remote("put", e))
            }
            Err(_) => {
                warn!(key, "put timed out after {:?}", duration);
                Err(Error::Timeout {
                    operation: "put",
                    duration,
                })
            }
        }
    }

    async fn watch(
        &self,
        key: &str,
        start_revision: Option<i64>,
    ) -> Result<ChangeStream> {
        let mut client = self.client.clone();
        let options = start_revision
            .filter(|rev| *rev > 0)
            .map(|rev| WatchOptions::new().with_start_revision(rev));

        let (watcher, watch_stream) = client
            .watch(key, options)
            .await
            .map_err(|e| Error::remote("watch", e))?;
        debug!(key, ?start_revision, watch_id = watcher.watch_id(), "watch established");

        // The watcher keeps the request half of the stream open; it has to
        // live as long as the responses are consumed.
        let changes = stream::unfold(Some((watcher, watch_stream)), |state| async move {
            let (watcher, mut watch_stream) = state?;
            match watch_stream.message().await {
                Ok(Some(response)) if response.canceled() => {
                    warn!(
                        compact_revision = response.compact_revision(),
                        "watch canceled by server: {}",
                        response.cancel_reason()
                    );
                    Some((
                        Err(Error::WatchCanceled {
                            reason: response.cancel_reason().to_string(),
                            compact_revision: response.compact_revision(),
                        }),
                        None,
                    ))
                }
                Ok(Some(response)) => Some((Ok(to_change_events(&response)), Some((watcher, watch_stream)))),
                Ok(None) => None,
                Err(e) => Some((Err(Error::remote("watch", e)), None)),
            }
        });

        Ok(changes.boxed())
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<RemoteEntry>> {
        let mut client = self.client.clone();
        let response = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| Error::remote("scan_prefix", e))?;

        Ok(response
            .kvs()
            .iter()
            .map(|kv| RemoteEntry {
                key: String::from_utf8_lossy(kv.key()).into_owned(),
                value: kv.value().to_vec(),
            })
            .collect())
    }
}

fn to_change_events(response: &WatchResponse) -> Vec<ChangeEvent> {
    response
        .events()
        .iter()
        .filter_map(|event| {
            let kv = event.kv()?;
            let kind = match event.event_type() {
                EventType::Put if kv.version() == 1 => ChangeKind::Create,
                EventType::Put => ChangeKind::Modify,
                EventType::Delete => ChangeKind::Delete,
            };
            Some(ChangeEvent {
                kind,
                key: String::from_utf8_lossy(kv.key()).into_owned(),
                value: kv.value().to_vec(),
                mod_revision: kv.mod_revision(),
            })
        })
        .collect()
}
