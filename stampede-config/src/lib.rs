//! Configuration management for Stampede
//!
//! This crate provides the run configuration split by functional domains
//! (scenarios, thresholds, options, http, logging), with validation,
//! defaults, and environment variable support.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigFormat, ConfigLoader};
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    http::{EndpointConfig, HttpConfig, LoginConfig, ResponseChecks},
    logging::{LogFormat, LogLevel, LoggingConfig},
    options::OptionsConfig,
    scenarios::{ScenarioConfig, ScenariosConfig},
    thresholds::{DetailedThreshold, ThresholdEntry, ThresholdsConfig},
    StampedeConfig,
};

// Re-export utilities
pub use domains::utils::parse_key_value;
