//! Error hierarchy for the configuration bridge
//!
//! Setup-phase failures (connect, cache directory creation, initial write,
//! initial parse) are returned to the caller. Failures inside the watch loop
//! never surface here; they are published as [`crate::SyncEvent`]s instead.


use std::path::PathBuf;
use std::time::Duration;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Client construction, authentication or the reachability check failed
    #[error("Failed to connect to {endpoints:?}: {source}")]
    Connection {
        endpoints: Vec<String>,
        #[source]
        source: Box<etcd_client::Error>,
    },

    /// A remote call failed after the connection was established
    #[error("Remote store {operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: Box<etcd_client::Error>,
    },

    /// The server canceled a watch, e.g. because the start revision was compacted
    #[error("Watch canceled (compact revision {compact_revision}): {reason}")]
    WatchCanceled {
        reason: String,
        compact_revision: i64,
    },

    /// A bounded remote call ran out of time
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    /// Cache directory or file operation failed
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cache content could not be parsed in the declared format
    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    /// Typed lookup of a single key failed
    #[error("Failed to read key `{key}`: {source}")]
    Lookup {
        key: String,
        #[source]
        source: config::ConfigError,
    },

    /// Bridge settings could not be loaded
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// Bridge settings were loaded but are not usable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local file watcher could not be installed
    #[error("File watcher error: {0}")]
    FileWatch(#[from] notify::Error),

    /// `start` was called on a handle that is already running
    #[error("Watcher already started")]
    AlreadyStarted,

    /// Typed settings were requested before `start` completed
    #[error("Watcher not started, call start() first")]
    NotStarted,
}

impl Error {
    pub(crate) fn remote(
        operation: &'static str,
        source: etcd_client::Error,
    ) -> Self {
        Error::Remote {
            operation,
            source: Box::new(source),
        }
    }

    pub(crate) fn io(
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error happened before the remote store could be reached.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. } | Error::Timeout { operation: "connect", .. })
    }
}
