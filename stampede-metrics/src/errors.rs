//! Metrics error types

use crate::series::MetricKind;
use thiserror::Error;

/// Result type for metrics operations
pub type MetricsResult<T> = std::result::Result<T, MetricsError>;

/// Metrics-related errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    /// Metric names must be identifiers
    #[error("Invalid metric name '{0}'")]
    InvalidName(String),

    /// A name is bound to one kind for the whole run
    #[error("Metric '{name}' is a {existing}, cannot record a {requested} sample")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    /// Counters never decrease
    #[error("Counter '{name}' cannot be incremented by {delta}")]
    InvalidCounterDelta { name: String, delta: f64 },

    /// Trend values must lie in `[0, digest::MAX_VALUE]`
    #[error("Trend value {0} is outside the recordable range")]
    InvalidTrendValue(f64),

    /// Gauge values must be finite
    #[error("Gauge value {0} is not finite")]
    InvalidGaugeValue(f64),

    /// Unknown trend statistic such as `mean` or `p(120)`
    #[error("Unknown trend statistic '{0}'")]
    InvalidStat(String),

    /// The underlying histogram rejected an operation
    #[error("Histogram error: {0}")]
    Histogram(String),
}
