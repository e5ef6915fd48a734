//! Coordination client adapter
//!
//! Provides the seam between the bridge and the remote key-value store:
//! - [`RemoteStore`] - get/put/watch/prefix-scan contract
//! - [`EtcdStore`] - etcd v3 implementation
//! - [`RemoteKey`] - `prefix/group/format` key scheme and cache layout
//!
//! Connection establishment, leader discovery and transport retries are left
//! to the underlying etcd client.

mod etcd;
mod key;

pub use etcd::*;
pub use key::*;


use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Stream of watch batches; one item per response from the remote store
pub type ChangeStream = BoxStream<'static, Result<Vec<ChangeEvent>>>;

/// Result of a single-key read
///
/// An absent key is reported as an empty `value`; absent and present-but-empty
/// keys look the same to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fetched {
    pub value: Vec<u8>,
    /// Store revision at the time of the read
    pub revision: i64,
}

/// One key/value pair returned by a prefix scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub key: String,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// First version of the key
    Create,
    /// Update of an existing key
    Modify,
    Delete,
}

/// A single key change delivered by a watch subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub key: String,
    /// New value; empty for deletes
    pub value: Vec<u8>,
    pub mod_revision: i64,
}

impl ChangeEvent {
    /// Only creates and modifications update the cache
    pub fn is_actionable(&self) -> bool {
        matches!(self.kind, ChangeKind::Create | ChangeKind::Modify)
    }
}

/// Remote key-value store operations used by the bridge
///
/// Implementations must be safe for concurrent use; the bridge calls them
/// from the watch task and from caller tasks at the same time.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Single-key read; absent keys yield an empty value
    async fn get(
        &self,
        key: &str,
    ) -> Result<Fetched>;

    /// Bounded write without retry or compare-and-swap
    ///
    /// # Returns
    /// Revision created by the write
    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        timeout: Duration,
    ) -> Result<i64>;

    /// Subscribe to changes on `key`, replaying from `start_revision` when given
    async fn watch(
        &self,
        key: &str,
        start_revision: Option<i64>,
    ) -> Result<ChangeStream>;

    /// One-shot read of every key starting with `prefix`
    async fn scan_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<RemoteEntry>>;
}
