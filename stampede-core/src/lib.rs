//! Core domain models and types for Stampede
//!
//! This crate contains the scenario model, tag sets, the immutable run
//! context and the error taxonomy shared by every other Stampede crate.
//! It has minimal dependencies and defines the domain language of the
//! load generator.

pub mod context;
pub mod error;
pub mod scenario;
pub mod tags;

// Re-export commonly used types at the crate root
pub use context::{EnvOverrides, TestRunContext, PROCESS_VARS, SCENARIO_ENV};
pub use error::{
    IterationError, IterationErrorKind, Result, ScenarioError, SetupError, StampedeError,
    TeardownError,
};
pub use scenario::{
    interpolate_stages, validate_scenarios, Executor, ExecutorKind, ScenarioSpec, ScenarioState,
    Stage, ThinkTime,
};
pub use tags::TagSet;
