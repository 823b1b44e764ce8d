//! Error types for the sluice live data pipeline.
//!
//! Per-sample anomalies (out-of-order, duplicates, non-finite values) are not
//! errors: the controller absorbs them and reports a boolean. The types here
//! cover caller logic bugs and configuration mistakes only.
//!
//! [`RingError`] is returned directly by the ring buffer accessors; it never
//! crosses the controller API.

use thiserror::Error;

/// The main error type for all sluice operations.
#[derive(Error, Debug)]
pub enum SluiceError {
    /// Error validating or loading configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by [`RingBuffer`](crate::ring::RingBuffer) accessors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    /// A logical index past the newest element was requested.
    #[error("index {index} out of range for ring buffer of length {len}")]
    IndexOutOfRange {
        /// The requested logical index.
        index: usize,
        /// The number of live elements at the time of the request.
        len: usize,
    },

    /// An operation that needs at least one element ran on an empty buffer.
    #[error("ring buffer is empty")]
    Empty,
}

/// Errors raised while validating or loading a
/// [`ControllerConfig`](crate::config::ControllerConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Ring buffer capacity must be at least one.
    #[error("invalid capacity: {capacity} (must be > 0)")]
    InvalidCapacity {
        /// The rejected capacity.
        capacity: usize,
    },

    /// A retention policy parameter is out of range.
    #[error("invalid retention policy: {reason}")]
    InvalidRetention {
        /// Description of the offending parameter.
        reason: String,
    },

    /// The ingest rate window must be non-zero.
    #[error("invalid rate window: must be greater than zero")]
    InvalidRateWindow,

    /// Failed to read a configuration file.
    #[error("failed to load configuration from '{path}': {source}")]
    Load {
        /// The configuration file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration JSON.
    #[error("failed to parse configuration from '{path}': {source}")]
    Parse {
        /// The configuration source (file path, or `<inline>`).
        path: String,
        /// The underlying JSON parsing error.
        #[source]
        source: serde_json::Error,
    },
}

/// Type alias for `Result<T, SluiceError>`.
pub type Result<T> = std::result::Result<T, SluiceError>;
