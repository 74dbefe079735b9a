//! File-based configuration.
//!
//! ```json
//! {
//!   "store":     { "path": "/var/lib/logsink", "sync_interval": 1 },
//!   "ingest":    { "fixed_sender": "ExampleApp" },
//!   "reconnect": { "max_attempts": 15, "attempt_delay_ms": 5000 }
//! }
//! ```
//!
//! Every section and field is optional.

use crate::error::{Result, StoreError};
use crate::ingest::IngestConfig;
use crate::store::StoreConfig;
use crate::subscriber::ReconnectPolicy;
use serde::Deserialize;
use std::path::Path;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub reconnect: ReconnectPolicy,
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Durations as whole milliseconds.
pub(crate) mod serde_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }

    /// `null` disables.
    pub mod option {
        use super::*;

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
        }
    }
}
