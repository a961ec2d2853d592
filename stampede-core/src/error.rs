//! Core error types for Stampede

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Core error type covering every failure class of a run
#[derive(Debug, Error)]
pub enum StampedeError {
    /// Scenario model validation errors
    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    /// Setup hook failed; fatal before any traffic is generated
    #[error("Setup failed: {0}")]
    Setup(#[from] SetupError),

    /// A single iteration failed; never fatal on its own
    #[error("Iteration error: {0}")]
    Iteration(#[from] IterationError),

    /// The scheduler could not keep scenarios consistent; fatal
    #[error("Scheduler fault: {0}")]
    SchedulerFault(String),

    /// A threshold predicate did not hold
    #[error("Threshold '{predicate}' on '{selector}' breached (observed {observed:?})")]
    ThresholdBreach {
        selector: String,
        predicate: String,
        observed: Option<f64>,
    },

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Stampede
pub type Result<T> = std::result::Result<T, StampedeError>;

/// Scenario validation errors, reported before any traffic starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    #[error("At least one scenario must be configured")]
    NoScenarios,

    #[error("Scenario name cannot be empty")]
    EmptyName,

    #[error("Scenario name '{name}' is invalid: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Scenario '{0}' is defined more than once")]
    Duplicate(String),

    #[error("Scenario '{scenario}': {field} must be greater than 0")]
    ZeroDuration { scenario: String, field: String },

    #[error("Scenario '{0}': ramping-concurrency requires at least one stage")]
    NoStages(String),

    #[error("Scenario '{0}': think time minimum exceeds maximum")]
    InvalidThinkTime(String),
}

/// Setup hook failures
#[derive(Debug, Clone, Error)]
pub enum SetupError {
    #[error("{0}")]
    Failed(String),

    #[error("setup did not complete within {0:?}")]
    Timeout(Duration),

    #[error("setup panicked: {0}")]
    Panicked(String),
}

/// Teardown hook failures; logged, never affect the verdict
#[derive(Debug, Clone, Error)]
pub enum TeardownError {
    #[error("{0}")]
    Failed(String),

    #[error("teardown did not complete within {0:?}")]
    Timeout(Duration),

    #[error("teardown panicked: {0}")]
    Panicked(String),
}

/// Classification of a failed iteration, used as the `error_kind` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IterationErrorKind {
    /// The routine reported a failure
    Failed,
    /// The routine exceeded its iteration timeout
    Timeout,
    /// The routine panicked
    Panicked,
    /// The transport (network, protocol) failed
    Transport,
}

impl IterationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IterationErrorKind::Failed => "failed",
            IterationErrorKind::Timeout => "timeout",
            IterationErrorKind::Panicked => "panicked",
            IterationErrorKind::Transport => "transport",
        }
    }
}

impl fmt::Display for IterationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised inside one iteration of a virtual user
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct IterationError {
    kind: IterationErrorKind,
    message: String,
}

impl IterationError {
    pub fn new(kind: IterationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(IterationErrorKind::Failed, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(IterationErrorKind::Transport, message)
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            IterationErrorKind::Timeout,
            format!("iteration exceeded {:?}", limit),
        )
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self::new(IterationErrorKind::Panicked, message)
    }

    pub fn kind(&self) -> IterationErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl StampedeError {
    /// Whether this error terminates traffic generation
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StampedeError::Setup(_) | StampedeError::SchedulerFault(_) | StampedeError::Scenario(_)
        )
    }

    /// Stable error code used in the run summary
    pub fn error_code(&self) -> &'static str {
        match self {
            StampedeError::Scenario(_) => "INVALID_SCENARIO",
            StampedeError::Setup(_) => "SETUP_FAILURE",
            StampedeError::Iteration(_) => "ITERATION_ERROR",
            StampedeError::SchedulerFault(_) => "SCHEDULER_FAULT",
            StampedeError::ThresholdBreach { .. } => "THRESHOLD_BREACH",
            StampedeError::Other(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(StampedeError::from(SetupError::Failed("down".to_string())).is_fatal());
        assert!(StampedeError::SchedulerFault("worker panic".to_string()).is_fatal());
        assert!(!StampedeError::from(IterationError::failed("500")).is_fatal());
        assert!(!StampedeError::ThresholdBreach {
            selector: "http_req_failed".to_string(),
            predicate: "rate<0.01".to_string(),
            observed: Some(0.2),
        }
        .is_fatal());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StampedeError::from(SetupError::Timeout(Duration::from_secs(5))).error_code(),
            "SETUP_FAILURE"
        );
        assert_eq!(
            StampedeError::from(ScenarioError::NoScenarios).error_code(),
            "INVALID_SCENARIO"
        );
    }

    #[test]
    fn test_iteration_error_kinds() {
        let err = IterationError::timeout(Duration::from_secs(2));
        assert_eq!(err.kind(), IterationErrorKind::Timeout);
        assert_eq!(err.kind().as_str(), "timeout");
        assert!(err.to_string().starts_with("timeout:"));

        let err = IterationError::transport("connection refused");
        assert_eq!(err.message(), "connection refused");
    }
}
