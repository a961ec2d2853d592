//! Threshold error types

use thiserror::Error;

/// Result type for threshold operations
pub type ThresholdResult<T> = std::result::Result<T, ThresholdError>;

/// Threshold parsing and evaluation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("Invalid threshold expression '{0}'")]
    InvalidExpression(String),

    #[error("Invalid metric selector '{0}'")]
    InvalidSelector(String),

    #[error("Invalid threshold predicate '{0}'")]
    InvalidPredicate(String),

    #[error("Unknown statistic '{0}'")]
    UnknownStatistic(String),

    #[error("Percentile {0} is outside 0..=100")]
    InvalidPercentile(f64),

    #[error("Statistic '{statistic}' does not apply to {kind} metric '{metric}'")]
    UnsupportedStatistic {
        statistic: String,
        kind: String,
        metric: String,
    },
}
