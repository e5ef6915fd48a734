//! Service discovery scan
//!
//! Services register themselves under `<prefix>/<service>/<instance>`; a
//! prefix scan groups the registered values by service name. The scan is
//! one-shot: no caching, no incremental updates, no deduplication.

#[cfg(test)]
mod discovery_test;

use std::collections::HashMap;

use crate::RemoteEntry;

/// Group scanned entries by service name
///
/// The service name is the second-to-last `/`-separated segment of the key.
/// Keys with fewer than two segments are skipped. Every entry contributes one
/// value, repeated values included.
pub fn group_by_service(entries: impl IntoIterator<Item = RemoteEntry>) -> HashMap<String, Vec<String>> {
    let mut services: HashMap<String, Vec<String>> = HashMap::new();
    for entry in entries {
        let parts: Vec<&str> = entry.key.split('/').collect();
        if parts.len() < 2 {
            continue;
        }
        let service = parts[parts.len() - 2].to_string();
        services
            .entry(service)
            .or_default()
            .push(String::from_utf8_lossy(&entry.value).into_owned());
    }
    services
}
