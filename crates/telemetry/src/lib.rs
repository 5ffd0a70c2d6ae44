//! Zone Monitoring Domain Types
//!
//! Defines the core vocabulary shared by every component: monitored zones,
//! the closed set of environmental metrics, per-tick readings, safe-range
//! thresholds and incident severity.

mod metric;
mod reading;
mod threshold;
mod zone;

pub use metric::{Metric, UnknownMetric};
pub use reading::Reading;
pub use threshold::{Severity, SeverityBands, Threshold, ThresholdSet};
pub use zone::Zone;

use thiserror::Error;

/// Errors in static configuration, fatal at startup only
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Threshold with lower bound above upper bound
    #[error("invalid threshold for {metric}: lower {lower} > upper {upper}")]
    InvalidThreshold {
        metric: Metric,
        lower: f64,
        upper: f64,
    },

    /// Generator bounds with lower bound above upper bound
    #[error("invalid generator bounds for {metric}: [{lower}, {upper}]")]
    InvalidBounds {
        metric: Metric,
        lower: f64,
        upper: f64,
    },

    /// Noise amplitude outside (0, 1]
    #[error("noise amplitude {0} must be in (0, 1]")]
    InvalidNoiseAmplitude(f64),

    /// No threshold configured for any metric
    #[error("threshold table is empty")]
    EmptyThresholds,

    /// Severity band boundaries out of order
    #[error("invalid severity bands: medium {medium} must be positive and below high {high}")]
    InvalidSeverityBands { medium: f64, high: f64 },

    /// Two zones sharing one id
    #[error("duplicate zone id {0}")]
    DuplicateZone(u32),
}
