use std::fmt;
use std::str::FromStr;

use config::FileFormat;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;

/// Document format of the configuration blob
///
/// Doubles as the last segment of the remote key and the cache file extension.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    #[default]
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Yaml => "yaml",
        }
    }

    /// Document written when the remote key is absent or unreadable
    pub fn empty_document(&self) -> &'static [u8] {
        match self {
            ConfigFormat::Json => b"{}",
            ConfigFormat::Yaml => b"",
        }
    }

    pub(crate) fn file_format(&self) -> FileFormat {
        match self {
            ConfigFormat::Json => FileFormat::Json,
            ConfigFormat::Yaml => FileFormat::Yaml,
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ConfigFormat::Json),
            "yaml" => Ok(ConfigFormat::Yaml),
            other => Err(Error::InvalidConfig(format!(
                "unsupported config format `{other}`, expected json or yaml"
            ))),
        }
    }
}
