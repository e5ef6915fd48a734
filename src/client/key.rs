use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use crate::ConfigFormat;

/// File name (without extension) of every cache file
pub const CACHE_FILE_STEM: &str = "application";

/// Remote key of one configuration blob: `prefix/group/format`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteKey {
    prefix: String,
    group: String,
    format: ConfigFormat,
}

impl RemoteKey {
    pub fn new(
        prefix: impl Into<String>,
        group: impl Into<String>,
        format: ConfigFormat,
    ) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            group: group.into(),
            format,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    /// Same prefix, with group and/or format replaced
    pub fn sibling(
        &self,
        group: Option<&str>,
        format: Option<ConfigFormat>,
    ) -> Self {
        Self {
            prefix: self.prefix.clone(),
            group: group
                .filter(|g| !g.is_empty())
                .unwrap_or(&self.group)
                .to_string(),
            format: format.unwrap_or(self.format),
        }
    }

    /// Directory holding the cache file: `<root>/<prefix>/<group>/<format>`
    ///
    /// Leading separators of the prefix are dropped so the result always
    /// stays below `root`.
    pub fn cache_dir(
        &self,
        root: &Path,
    ) -> PathBuf {
        let mut dir = root.to_path_buf();
        dir.extend(self.prefix.split('/').filter(|s| !s.is_empty()));
        dir.push(&self.group);
        dir.push(self.format.as_str());
        dir
    }

    /// Full cache file path: `<cache_dir>/application.<format>`
    pub fn cache_file(
        &self,
        root: &Path,
    ) -> PathBuf {
        self.cache_dir(root)
            .join(format!("{}.{}", CACHE_FILE_STEM, self.format.as_str()))
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}/{}", self.prefix, self.group, self.format)
    }
}
