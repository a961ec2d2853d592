//! HTTP scenario for Stampede
//!
//! Provides the setup hook that health-checks and logs in to the target, and
//! the iteration routine that exercises the configured endpoints and records
//! request metrics.

pub mod client;
pub mod errors;
pub mod iteration;
pub mod lifecycle;
pub mod template;
pub mod types;

pub use client::{HttpTarget, BASE_URL_ENV};
pub use errors::HttpError;
pub use iteration::HttpIteration;
pub use lifecycle::{HttpLifecycle, TOKEN_KEY};
pub use types::{HttpMethod, HttpMethodError};

use stampede_config::HttpConfig;

/// Lifecycle and iteration routine sharing one connection pool
pub fn http_scenario(config: HttpConfig) -> Result<(HttpLifecycle, HttpIteration), HttpError> {
    let target = HttpTarget::new(config)?;
    let iteration = HttpIteration::new(target.clone())?;
    Ok((HttpLifecycle::new(target), iteration))
}
