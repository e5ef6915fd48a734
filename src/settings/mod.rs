//! Bridge settings
//!
//! Settings are assembled from several sources with increasing priority:
//! 1. Default values (hardcoded)
//! 2. Settings file (explicit path or `HUB_CONFIG_FILE`)
//! 3. Environment variables (`HUB_CONFIG__<FIELD>`, highest priority)
//!
//! The cache root directory is resolved once while the settings are built
//! (`HUB_CONFIG_ROOT`, then `HOME`) and never read from the environment again.

mod format;
mod retry;

pub use format::*;
pub use retry::*;


use std::env;
use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Environment variable selecting the root directory of cache files
pub const CACHE_ROOT_ENV: &str = "HUB_CONFIG_ROOT";

/// Environment variable pointing at an optional settings file
pub const SETTINGS_FILE_ENV: &str = "HUB_CONFIG_FILE";

/// Prefix for per-field environment overrides
pub const ENV_PREFIX: &str = "HUB_CONFIG";

/// Default key prefix on the remote store
pub const DEFAULT_KEY_PREFIX: &str = "/hub-config/etcd";

/// Connection and synchronization settings for one [`crate::ConfigBridge`]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BridgeConfig {
    /// etcd endpoints, e.g. `http://127.0.0.1:2379`
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// User for authentication, only used together with `password`
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication; empty means no authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Configuration group, second segment of the remote key
    #[serde(default)]
    pub group: String,

    /// Document format of the stored blob
    #[serde(default)]
    pub format: ConfigFormat,

    /// Key prefix on the remote store
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Root directory under which cache files are written
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// Upper bound for establishing the connection
    /// Default: 30 seconds
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    /// Interval between keep-alive pings
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,

    /// Time to wait for a keep-alive ack before the connection is dropped
    /// Default: 10 seconds
    #[serde(default = "default_keep_alive_timeout_ms")]
    pub keep_alive_timeout_ms: u64,

    /// Upper bound for a single put
    /// Default: 5 seconds
    #[serde(default = "default_put_timeout_ms")]
    pub put_timeout_ms: u64,

    /// Also reload when the cache file is edited locally
    #[serde(default)]
    pub watch_local_file: bool,

    /// Re-subscription policy when the watch stream breaks
    #[serde(default)]
    pub watch_retry: WatchRetryPolicy,

    /// Capacity of the sync event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl BridgeConfig {
    /// Settings with defaults for everything but the required fields
    pub fn new(
        endpoints: Vec<String>,
        group: impl Into<String>,
        format: ConfigFormat,
    ) -> Self {
        Self {
            endpoints,
            username: None,
            password: None,
            group: group.into(),
            format,
            prefix: default_prefix(),
            cache_root: default_cache_root(),
            dial_timeout_ms: default_dial_timeout_ms(),
            keep_alive_interval_ms: default_keep_alive_interval_ms(),
            keep_alive_timeout_ms: default_keep_alive_timeout_ms(),
            put_timeout_ms: default_put_timeout_ms(),
            watch_local_file: false,
            watch_retry: WatchRetryPolicy::default(),
            event_buffer: default_event_buffer(),
        }
    }

    /// Load settings from the layered sources
    ///
    /// # Arguments
    /// * `path` - Optional settings file; when absent `HUB_CONFIG_FILE` is consulted
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if let Ok(path) = env::var(SETTINGS_FILE_ENV) {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("endpoints"),
        );

        let settings: BridgeConfig = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_prefix(
        mut self,
        prefix: impl Into<String>,
    ) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_password(
        mut self,
        password: impl Into<String>,
    ) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_cache_root(
        mut self,
        root: impl Into<PathBuf>,
    ) -> Self {
        self.cache_root = root.into();
        self
    }

    pub fn with_local_file_watch(
        mut self,
        enable: bool,
    ) -> Self {
        self.watch_local_file = enable;
        self
    }

    pub fn with_watch_retry(
        mut self,
        policy: WatchRetryPolicy,
    ) -> Self {
        self.watch_retry = policy;
        self
    }

    /// `(user, password)` when a non-empty password is configured
    pub fn credentials(&self) -> Option<(String, String)> {
        match self.password.as_deref() {
            Some(password) if !password.is_empty() => Some((
                self.username.clone().unwrap_or_else(|| "root".to_string()),
                password.to_string(),
            )),
            _ => None,
        }
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.keep_alive_timeout_ms)
    }

    pub fn put_timeout(&self) -> Duration {
        Duration::from_millis(self.put_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::InvalidConfig(
                "endpoints must contain at least one address".into(),
            ));
        }
        if self.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(Error::InvalidConfig("endpoints cannot contain empty addresses".into()));
        }

        if self.group.is_empty() || self.group.contains('/') {
            return Err(Error::InvalidConfig(format!(
                "group `{}` must be non-empty and free of '/'",
                self.group
            )));
        }

        if self.prefix.trim_matches('/').is_empty() {
            return Err(Error::InvalidConfig("prefix cannot be empty".into()));
        }

        if self.cache_root.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("cache_root path cannot be empty".into()));
        }

        for (name, value) in [
            ("dial_timeout_ms", self.dial_timeout_ms),
            ("keep_alive_interval_ms", self.keep_alive_interval_ms),
            ("keep_alive_timeout_ms", self.keep_alive_timeout_ms),
            ("put_timeout_ms", self.put_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be greater than 0")));
            }
        }

        if self.event_buffer == 0 {
            return Err(Error::InvalidConfig("event_buffer must be greater than 0".into()));
        }

        self.watch_retry.validate()
    }
}

fn default_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

/// `HUB_CONFIG_ROOT`, then `HOME`, then the working directory
fn default_cache_root() -> PathBuf {
    env::var_os(CACHE_ROOT_ENV)
        .filter(|v| !v.is_empty())
        .or_else(|| env::var_os("HOME").filter(|v| !v.is_empty()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_dial_timeout_ms() -> u64 {
    30_000
}
fn default_keep_alive_interval_ms() -> u64 {
    30_000
}
fn default_keep_alive_timeout_ms() -> u64 {
    10_000
}
fn default_put_timeout_ms() -> u64 {
    5_000
}
fn default_event_buffer() -> usize {
    64
}
