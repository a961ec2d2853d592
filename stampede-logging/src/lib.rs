//! Logging initialisation for Stampede
//!
//! Every crate logs through `tracing` (or `log`, bridged into `tracing`);
//! this crate installs the global subscriber from a [`LoggingConfig`].
//! Output goes to stderr so the run summary can own stdout.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
pub use stampede_config::{LogFormat, LogLevel, LoggingConfig};
