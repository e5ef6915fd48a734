//! Typed view over the cache file
//!
//! [`TypedStore`] parses the cache document (JSON or YAML) with the `config`
//! crate and hands out typed values by dotted key path (`server.port`).
//! The parsed document sits behind an [`ArcSwap`], so accessors never block
//! and a reload is a single atomic pointer swap. A failed reload keeps the
//! last-known-good document.
//!
//! Typed getters follow a zero-value convention: a missing or unconvertible
//! key yields the type's default. Use [`TypedStore::get`] when the caller
//! needs to tell the difference.

mod convert;

pub use convert::*;


use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::DateTime;
use chrono::Utc;
use config::Config;
use config::ConfigError;
use config::File;
use config::Map;
use config::Value;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use crate::ConfigFormat;
use crate::Error;
use crate::Result;

pub struct TypedStore {
    path: PathBuf,
    format: ConfigFormat,
    current: ArcSwap<Config>,
}

impl TypedStore {
    /// Parse the cache file at `path`
    ///
    /// # Errors
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Parse`] if the content is not a valid document of `format`
    pub fn load(
        path: impl Into<PathBuf>,
        format: ConfigFormat,
    ) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read(&path).map_err(|e| Error::io(&path, e))?;
        Self::from_bytes(path, format, &content)
    }

    /// Build a store from content that is (or will be) stored at `path`
    pub fn from_bytes(
        path: impl Into<PathBuf>,
        format: ConfigFormat,
        content: &[u8],
    ) -> Result<Self> {
        let path = path.into();
        let parsed = parse(&path, format, content)?;
        Ok(Self {
            path,
            format,
            current: ArcSwap::from_pointee(parsed),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    /// Replace the in-memory document with `content`
    ///
    /// On error the previous document stays in place.
    pub fn reload_from_bytes(
        &self,
        content: &[u8],
    ) -> Result<()> {
        match parse(&self.path, self.format, content) {
            Ok(parsed) => {
                self.current.store(Arc::new(parsed));
                debug!(path = ?self.path, "typed store reloaded");
                Ok(())
            }
            Err(e) => {
                warn!(path = ?self.path, "keeping previous document: {}", e);
                Err(e)
            }
        }
    }

    /// Re-read the cache file from disk
    pub fn reload(&self) -> Result<()> {
        let content = std::fs::read(&self.path).map_err(|e| Error::io(&self.path, e))?;
        self.reload_from_bytes(&content)
    }

    /// Strict typed lookup
    ///
    /// # Errors
    /// [`Error::Lookup`] when the key is missing or cannot be converted to `T`
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<T> {
        self.current.load().get::<T>(key).map_err(|source| Error::Lookup {
            key: key.to_string(),
            source,
        })
    }

    /// Raw value at `key`, `None` when absent
    pub fn get_value(
        &self,
        key: &str,
    ) -> Option<Value> {
        self.current.load().get::<Value>(key).ok()
    }

    pub fn is_set(
        &self,
        key: &str,
    ) -> bool {
        self.get_value(key).is_some()
    }

    pub fn get_string(
        &self,
        key: &str,
    ) -> String {
        self.lenient(key)
    }

    pub fn get_bool(
        &self,
        key: &str,
    ) -> bool {
        self.lenient(key)
    }

    pub fn get_int(
        &self,
        key: &str,
    ) -> i64 {
        self.lenient(key)
    }

    pub fn get_i32(
        &self,
        key: &str,
    ) -> i32 {
        self.lenient(key)
    }

    pub fn get_i64(
        &self,
        key: &str,
    ) -> i64 {
        self.lenient(key)
    }

    pub fn get_uint(
        &self,
        key: &str,
    ) -> u64 {
        self.lenient(key)
    }

    pub fn get_u32(
        &self,
        key: &str,
    ) -> u32 {
        self.lenient(key)
    }

    pub fn get_u64(
        &self,
        key: &str,
    ) -> u64 {
        self.lenient(key)
    }

    pub fn get_f64(
        &self,
        key: &str,
    ) -> f64 {
        self.lenient(key)
    }

    /// Integers are nanoseconds; strings may carry units (`1h30m`, `250ms`)
    pub fn get_duration(
        &self,
        key: &str,
    ) -> Duration {
        self.get::<String>(key)
            .ok()
            .and_then(|raw| parse_duration(&raw))
            .unwrap_or_default()
    }

    /// RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` or unix seconds
    pub fn get_time(
        &self,
        key: &str,
    ) -> DateTime<Utc> {
        self.get::<String>(key)
            .ok()
            .and_then(|raw| parse_time(&raw))
            .unwrap_or_default()
    }

    pub fn get_int_slice(
        &self,
        key: &str,
    ) -> Vec<i64> {
        self.lenient(key)
    }

    /// Arrays convert element-wise; a plain string is split on whitespace
    pub fn get_string_slice(
        &self,
        key: &str,
    ) -> Vec<String> {
        if let Ok(items) = self.get::<Vec<String>>(key) {
            return items;
        }
        self.get::<String>(key)
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn get_string_map(
        &self,
        key: &str,
    ) -> Map<String, Value> {
        self.current.load().get_table(key).unwrap_or_default()
    }

    pub fn get_string_map_string(
        &self,
        key: &str,
    ) -> HashMap<String, String> {
        self.lenient(key)
    }

    pub fn get_string_map_string_slice(
        &self,
        key: &str,
    ) -> HashMap<String, Vec<String>> {
        self.lenient(key)
    }

    /// Sizes like `10mb`, `1 GB` or `512k`, in powers of 1024
    pub fn get_size_in_bytes(
        &self,
        key: &str,
    ) -> u64 {
        self.get::<String>(key)
            .map(|raw| parse_size_in_bytes(&raw))
            .unwrap_or_default()
    }

    /// Whole document as a map of top-level keys
    pub fn all_settings(&self) -> Map<String, Value> {
        let snapshot = Config::clone(&self.current.load());
        snapshot.try_deserialize().unwrap_or_default()
    }

    fn lenient<T: DeserializeOwned + Default>(
        &self,
        key: &str,
    ) -> T {
        self.get::<T>(key).unwrap_or_default()
    }
}

fn parse(
    path: &Path,
    format: ConfigFormat,
    content: &[u8],
) -> Result<Config> {
    let text = std::str::from_utf8(content).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        source: ConfigError::Message(format!("content is not valid UTF-8: {e}")),
    })?;

    Config::builder()
        .add_source(File::from_str(text, format.file_format()))
        .build()
        .map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })
}
