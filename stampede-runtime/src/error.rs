//! Runtime error types

use stampede_config::ConfigError;
use stampede_core::ScenarioError;
use std::path::PathBuf;
use thiserror::Error;

use crate::summary::EXIT_INVALID_CONFIG;

/// Errors raised while assembling or reporting a run
///
/// Failures during the run itself (setup, scheduler faults, breaches) are
/// reported through the [`RunSummary`](crate::summary::RunSummary) instead.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Invalid scenario: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to write summary to {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize summary: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RunError {
    /// Process exit code for errors raised before any traffic
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Scenario(_) | RunError::Config(_) => EXIT_INVALID_CONFIG,
            RunError::Export { .. } | RunError::Serialization(_) => 1,
        }
    }
}

pub type RunResult<T> = Result<T, RunError>;
