//! Store configuration loaded from JSON.
//!
//! ```json
//! {
//!   "rollups": [
//!     { "granularity": 10, "retention": 360 },
//!     { "granularity": 3600, "retention": 168 }
//!   ],
//!   "shards": 64
//! }
//! ```
//!
//! `shards` is optional. `rollups` is validated while parsing, so a document
//! that loads successfully always describes a usable schedule.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::schedule::RollupSchedule;

/// Default number of lock shards in the in-memory backend.
pub const DEFAULT_SHARDS: usize = 64;

/// Configuration of an in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsdbConfig {
    /// Rollups every metric is bucketed at.
    #[serde(default)]
    pub rollups: RollupSchedule,

    /// Number of independently locked shards.
    #[serde(default = "default_shards")]
    pub shards: usize,
}

fn default_shards() -> usize {
    DEFAULT_SHARDS
}

impl Default for TsdbConfig {
    fn default() -> Self {
        Self {
            rollups: RollupSchedule::default(),
            shards: DEFAULT_SHARDS,
        }
    }
}

impl TsdbConfig {
    /// Creates a configuration with the default shard count.
    pub fn new(rollups: RollupSchedule) -> Self {
        Self {
            rollups,
            shards: DEFAULT_SHARDS,
        }
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not a valid configuration, and
    /// [`ConfigError::InvalidShardCount`] for a zero shard count.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::parse(&content, &path.display().to_string())
    }

    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Same as [`TsdbConfig::load`], minus the I/O failure.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::parse(json, "<inline>")
    }

    fn parse(json: &str, origin: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values the type system does not.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidShardCount`] for a zero shard count.
    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(ConfigError::InvalidShardCount { count: 0 }.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HourglassError;
    use crate::schedule::Rollup;

    #[test]
    fn test_from_json() {
        let config = TsdbConfig::from_json(
            r#"{"rollups": [{"granularity": 60, "retention": 60}], "shards": 8}"#,
        )
        .unwrap();
        assert_eq!(config.shards, 8);
        assert_eq!(config.rollups.rollups(), &[Rollup::new(60, 60)]);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = TsdbConfig::from_json("{}").unwrap();
        assert_eq!(config, TsdbConfig::default());
    }

    #[test]
    fn test_invalid_documents() {
        let err = TsdbConfig::from_json(r#"{"shards": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            HourglassError::Config(ConfigError::InvalidShardCount { count: 0 })
        ));

        let err = TsdbConfig::from_json(r#"{"rollups": []}"#).unwrap_err();
        assert!(matches!(err, HourglassError::Config(ConfigError::Parse { .. })));

        let err = TsdbConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, HourglassError::Config(ConfigError::Parse { .. })));
    }
}
