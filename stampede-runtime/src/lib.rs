//! Runtime components for Stampede
//!
//! This crate turns a validated scenario set into traffic: virtual-user
//! workers run the iteration routine, the scheduler reconciles worker pools
//! against each scenario's executor, and [`LoadTest`] wraps everything in
//! setup, teardown and threshold evaluation.

pub mod error;
pub mod lifecycle;
pub mod monitor;
pub mod scheduler;
pub mod signal;
pub mod summary;
pub mod worker;

// Re-export commonly used types
pub use error::{RunError, RunResult};
pub use lifecycle::{guarded_setup, guarded_teardown, Lifecycle, NoopLifecycle};
pub use load_test::{LoadTest, LoadTestBuilder, RunOptions};
pub use monitor::ThresholdMonitor;
pub use scheduler::{
    ScenarioReport, ScenarioStatus, Scheduler, SchedulerReport, DEFAULT_TICK,
};
pub use signal::{interrupt_on_shutdown_signal, AbortReason, AbortSignal};
pub use summary::{
    exit_code_for, FatalError, RunSummary, EXIT_INVALID_CONFIG, EXIT_OK, EXIT_SCHEDULER_FAULT,
    EXIT_SETUP_FAILURE, EXIT_THRESHOLDS_FAILED,
};
pub use worker::{iteration_fn, FnIteration, Iteration, IterationContext};
