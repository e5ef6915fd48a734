//! # hub-config
//!
//! Keeps a local configuration cache in sync with a key on an etcd cluster
//! and exposes typed accessors over it.
//!
//! - [`ConfigBridge`] - per (group, format) handle: initial fetch, cache
//!   file, typed view, background watch
//! - [`TypedStore`] - typed getters over the cached JSON/YAML document
//! - [`RemoteStore`] / [`EtcdStore`] - remote key-value operations
//! - [`BridgeConfig`] - layered settings (defaults, file, environment)
//! - [`SyncEvent`] - observable synchronization outcomes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hub_config::{BridgeConfig, ConfigBridge};
//!
//! #[tokio::main]
//! async fn main() -> hub_config::Result<()> {
//!     let bridge = ConfigBridge::connect(BridgeConfig::load(None)?).await?;
//!     bridge.start().await?;
//!
//!     let settings = bridge.settings()?;
//!     println!("port = {}", settings.get_int("server.port"));
//!
//!     let mut events = bridge.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("sync: {event:?}");
//!     }
//!     Ok(())
//! }
//! ```

mod bridge;
mod cache;
mod client;
mod discovery;
mod errors;
mod settings;
mod store;
mod watch;

pub mod metrics;

pub use bridge::*;
pub use cache::*;
pub use client::*;
pub use discovery::*;
pub use errors::*;
pub use settings::*;
pub use store::*;
pub use watch::SyncEvent;

#[cfg(test)]
pub(crate) mod test_utils;
