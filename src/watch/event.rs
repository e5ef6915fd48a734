/// Observable outcome of a cache synchronization step
///
/// Published on the channel returned by [`crate::ConfigBridge::subscribe`].
/// Errors are carried as rendered messages so events stay cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Cache file and typed view now reflect `revision`
    Applied { revision: i64, bytes: usize },

    /// The cache file could not be written; the previous content stays
    WriteFailed { revision: i64, error: String },

    /// The cache file was written but its content does not parse; the typed
    /// view keeps the last-known-good document
    ParseFailed { revision: i64, error: String },

    /// The watch stream was re-established after `revision`
    Resubscribed { revision: i64 },

    /// The local cache file was edited and reloaded
    LocalReload,

    /// The watch loop gave up; no further updates will arrive
    Closed { reason: String },
}

impl SyncEvent {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SyncEvent::WriteFailed { .. } | SyncEvent::ParseFailed { .. } | SyncEvent::Closed { .. }
        )
    }
}
