//! Controller configuration.
//!
//! [`ControllerConfig`] fixes everything a
//! [`LiveSeriesController`](crate::controller::LiveSeriesController) needs at
//! construction: ring capacity, retention policy, ordering and duplicate
//! handling, notification coalescing and the rate window. It deserializes
//! from JSON with every field optional, so a config file only names what it
//! changes.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::rate::DEFAULT_RATE_WINDOW;
use crate::retention::RetentionPolicy;

/// Default ring buffer capacity per series.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// What to do with a sample whose `x` is older than the series' newest `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfOrderBehavior {
    /// Keep it in arrival order.
    #[default]
    Accept,

    /// Keep it in arrival order and log a warning.
    AcceptWithWarning,

    /// Drop it; `add_point` returns `false`.
    Reject,

    /// Keep it and restore `x` order with a stable sort.
    ///
    /// Costs O(n log n) per out-of-order sample; meant for low-rate streams.
    AutoSort,
}

/// What to do with a sample whose `x` equals the series' newest `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateTimestampBehavior {
    /// Overwrite the newest sample in place.
    #[default]
    Replace,

    /// Drop the new sample; `add_point` returns `false`.
    KeepFirst,

    /// Insert the new sample alongside the old one.
    KeepBoth,

    /// Overwrite the newest sample with the mean of both `y` values.
    Average,
}

/// Configuration for a live series controller.
///
/// # Example
///
/// ```rust
/// use sluice::config::{ControllerConfig, DuplicateTimestampBehavior};
/// use sluice::retention::RetentionPolicy;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ControllerConfig::from_json_str(
///     r#"{
///         "capacity": 2048,
///         "retention": { "kind": "rolling_duration", "duration": 30000.0 },
///         "duplicates": "average",
///         "rate_window": 2.5
///     }"#,
/// )?;
///
/// assert_eq!(config.capacity, 2048);
/// assert_eq!(config.duplicates, DuplicateTimestampBehavior::Average);
/// assert_eq!(config.retention, RetentionPolicy::RollingDuration { duration: 30_000.0 });
/// assert!(config.coalescing);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Ring buffer capacity for every series. Must be greater than zero.
    pub capacity: usize,

    /// Retention policy shared by every series.
    pub retention: RetentionPolicy,

    /// Out-of-order sample handling.
    pub out_of_order: OutOfOrderBehavior,

    /// Duplicate timestamp handling.
    pub duplicates: DuplicateTimestampBehavior,

    /// Batch repaint notifications per frame tick. When `false`, every
    /// accepted write notifies synchronously.
    pub coalescing: bool,

    /// Sliding window for ingest rate reporting, serialized as seconds.
    #[serde(with = "duration_serde")]
    pub rate_window: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            retention: RetentionPolicy::default(),
            out_of_order: OutOfOrderBehavior::default(),
            duplicates: DuplicateTimestampBehavior::default(),
            coalescing: true,
            rate_window: DEFAULT_RATE_WINDOW,
        }
    }
}

impl ControllerConfig {
    /// Creates a configuration with the given capacity and retention policy,
    /// defaults elsewhere.
    pub fn new(capacity: usize, retention: RetentionPolicy) -> Self {
        Self {
            capacity,
            retention,
            ..Self::default()
        }
    }

    /// Sets the out-of-order behavior.
    #[must_use]
    pub fn with_out_of_order(mut self, behavior: OutOfOrderBehavior) -> Self {
        self.out_of_order = behavior;
        self
    }

    /// Sets the duplicate timestamp behavior.
    #[must_use]
    pub fn with_duplicates(mut self, behavior: DuplicateTimestampBehavior) -> Self {
        self.duplicates = behavior;
        self
    }

    /// Enables or disables notification coalescing.
    #[must_use]
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalescing = enabled;
        self
    }

    /// Sets the ingest rate window.
    #[must_use]
    pub fn with_rate_window(mut self, window: Duration) -> Self {
        self.rate_window = window;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `capacity` is zero
    /// - the retention policy has an out-of-range parameter
    /// - `rate_window` is zero
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidCapacity {
                capacity: self.capacity,
            }
            .into());
        }

        self.retention.validate()?;

        if self.rate_window.is_zero() {
            return Err(ConfigError::InvalidRateWindow.into());
        }

        Ok(())
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON, or any error from
    /// [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid configuration JSON, or any
    /// error from [`validate`](Self::validate).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        config.validate()?;

        Ok(config)
    }
}

/// Serde helper for `Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::SluiceError;

    #[test]
    fn test_default_is_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.rate_window, Duration::from_secs(5));
        assert_eq!(config.out_of_order, OutOfOrderBehavior::Accept);
        assert_eq!(config.duplicates, DuplicateTimestampBehavior::Replace);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ControllerConfig::new(0, RetentionPolicy::Unlimited);
        assert!(matches!(
            config.validate(),
            Err(SluiceError::Config(ConfigError::InvalidCapacity { capacity: 0 }))
        ));
    }

    #[test]
    fn test_zero_rate_window_rejected() {
        let config = ControllerConfig::default().with_rate_window(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(SluiceError::Config(ConfigError::InvalidRateWindow))
        ));
    }

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = ControllerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_json_roundtrip_preserves_rate_window() {
        let config = ControllerConfig::default()
            .with_out_of_order(OutOfOrderBehavior::AutoSort)
            .with_rate_window(Duration::from_millis(1500));
        let json = serde_json::to_string(&config).unwrap();

        assert!(json.contains("\"rate_window\":1.5"));
        assert!(json.contains("\"auto_sort\""));
        assert_eq!(ControllerConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_negative_rate_window_is_parse_error() {
        let err = ControllerConfig::from_json_str(r#"{"rate_window": -1.0}"#).unwrap_err();
        assert!(matches!(err, SluiceError::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_invalid_retention_rejected() {
        let err = ControllerConfig::from_json_str(
            r#"{"retention": {"kind": "rolling_count", "max_points": 0}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SluiceError::Config(ConfigError::InvalidRetention { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"capacity": 64, "coalescing": false}}"#).unwrap();

        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.capacity, 64);
        assert!(!config.coalescing);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ControllerConfig::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, SluiceError::Config(ConfigError::Load { .. })));
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "capacity = 5").unwrap();

        let err = ControllerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, SluiceError::Config(ConfigError::Parse { .. })));
    }
}
