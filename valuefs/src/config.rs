//! Configuration for the value store and the binary around it.
//!
//! Configuration is plain data: [`StoreConfig`] sizes the store actor and
//! [`ValueFsConfig`] adds the settings the CLI needs on top. Both deserialize
//! from JSON with every field optional, so a config file only names what it
//! changes:
//!
//! ```json
//! { "store": { "memory_values": 500 }, "write_delay": "30s" }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConfigError, Result};
use crate::path::parse_duration;

/// Default maximum number of samples kept in memory across all series.
pub const DEFAULT_MEMORY_VALUES: usize = 100;

/// Default number of requests that may queue for the actor.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default interval between periodic prunes.
pub const DEFAULT_WRITE_DELAY: Duration = Duration::from_secs(60);

/// Sizing for a [`Store`](crate::store::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum total samples retained in memory before pruning evicts the
    /// oldest. Zero keeps only each series' last value.
    pub memory_values: usize,

    /// Capacity of the request queue. Callers wait for space once it is full.
    pub queue_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memory_values: DEFAULT_MEMORY_VALUES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidQueueCapacity`] if the queue capacity is
    /// zero.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity {
                capacity: self.queue_capacity,
            }
            .into());
        }
        Ok(())
    }
}

/// Top-level configuration file for the `valuefs` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueFsConfig {
    /// Store sizing.
    pub store: StoreConfig,

    /// Interval between periodic prunes, written as a duration string such
    /// as `"1m"` or `"30s"`.
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub write_delay: Duration,
}

impl Default for ValueFsConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            write_delay: DEFAULT_WRITE_DELAY,
        }
    }
}

impl ValueFsConfig {
    /// Loads and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not a valid config, or any error from
    /// [`validate`](Self::validate).
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPruneInterval`] if the write delay is
    /// zero, or any error from [`StoreConfig::validate`].
    pub fn validate(&self) -> Result<()> {
        if self.write_delay.is_zero() {
            return Err(ConfigError::InvalidPruneInterval.into());
        }
        self.store.validate()
    }
}

fn serialize_duration<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{}ns", duration.as_nanos()))
}

fn deserialize_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse_duration(&text)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid duration: {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValueFsError;

    #[test]
    fn test_defaults_are_valid() {
        let config = ValueFsConfig::default();
        assert_eq!(config.store.memory_values, 100);
        assert_eq!(config.write_delay, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_queue_capacity_is_rejected() {
        let config = StoreConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValueFsError::Config(ConfigError::InvalidQueueCapacity { capacity: 0 }))
        ));
    }

    #[test]
    fn test_zero_memory_values_is_allowed() {
        let config = StoreConfig {
            memory_values: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ValueFsConfig =
            serde_json::from_str(r#"{ "store": { "memory_values": 500 }, "write_delay": "30s" }"#)
                .unwrap();
        assert_eq!(config.store.memory_values, 500);
        assert_eq!(config.store.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.write_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_roundtrip_duration_string() {
        let config = ValueFsConfig {
            write_delay: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ValueFsConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valuefs.json");
        std::fs::write(&path, r#"{ "write_delay": "5m" }"#).unwrap();

        let config = ValueFsConfig::from_json_file(&path).unwrap();
        assert_eq!(config.write_delay, Duration::from_secs(300));
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_from_json_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = ValueFsConfig::from_json_file(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(ValueFsError::Config(ConfigError::Read { .. }))));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "write_delay": "soon" }"#).unwrap();
        let bad = ValueFsConfig::from_json_file(&path);
        assert!(matches!(bad, Err(ValueFsError::Config(ConfigError::Parse { .. }))));

        std::fs::write(&path, r#"{ "write_delay": "0" }"#).unwrap();
        let zero = ValueFsConfig::from_json_file(&path);
        assert!(matches!(
            zero,
            Err(ValueFsError::Config(ConfigError::InvalidPruneInterval))
        ));
    }
}
