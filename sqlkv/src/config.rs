//! Store configuration.
//!
//! A store is described by the database file, the table inside it and the
//! serialization mode. The same structure can be loaded from YAML:
//!
//! ```yaml
//! path: /var/lib/app/settings.sqlite
//! table: ApplicationConfiguration
//! codec: json
//! busy_timeout_ms: 2000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{KVError, KVResult};

/// Table used when none is given.
pub const DEFAULT_TABLE: &str = "ApplicationConfiguration";

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

/// Configuration for opening a [`SqliteStore`](crate::SqliteStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file path, or a SQLite URI filename.
    pub path: PathBuf,

    /// Table holding the `k`/`v` rows.
    #[serde(default = "default_table")]
    pub table: String,

    /// Serialization mode for values.
    #[serde(default)]
    pub codec: Codec,

    /// How long a statement waits on a locked database before failing.
    /// Unset keeps the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: default_table(),
            codec: Codec::default(),
            busy_timeout_ms: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub(crate) fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout_ms.map(Duration::from_millis)
    }

    /// Loads a configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> KVResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| KVError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_yaml(&content)
    }

    /// Parses a configuration from YAML text.
    pub fn from_yaml(content: &str) -> KVResult<Self> {
        serde_yaml::from_str(content).map_err(|e| KVError::Config(e.to_string()))
    }

    /// Renders the configuration as YAML.
    pub fn to_yaml(&self) -> KVResult<String> {
        serde_yaml::to_string(self).map_err(|e| KVError::Config(e.to_string()))
    }
}
