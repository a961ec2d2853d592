//! HTTP error types

use crate::types::HttpMethodError;
use stampede_core::{IterationError, SetupError};
use stampede_metrics::MetricsError;

/// Error type for HTTP operations
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(#[from] HttpMethodError),

    #[error("Invalid placeholder '{placeholder}': {reason}")]
    InvalidPlaceholder { placeholder: String, reason: String },

    #[error("Environment variable '{0}' is not set")]
    MissingVariable(String),

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

impl HttpError {
    pub(crate) fn placeholder(placeholder: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPlaceholder {
            placeholder: placeholder.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<HttpError> for SetupError {
    fn from(error: HttpError) -> Self {
        SetupError::Failed(error.to_string())
    }
}

impl From<HttpError> for IterationError {
    fn from(error: HttpError) -> Self {
        match error {
            HttpError::NetworkError(e) if e.is_timeout() => {
                IterationError::transport(format!("request timed out: {}", e))
            }
            HttpError::NetworkError(e) => IterationError::transport(e.to_string()),
            other => IterationError::failed(other.to_string()),
        }
    }
}
