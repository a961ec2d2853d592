//! Setup and teardown hooks

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value as JsonValue;
use stampede_core::{EnvOverrides, SetupError, TeardownError, TestRunContext};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{info, warn};

use crate::worker::panic_message;

/// Run-level hooks around the scenarios
///
/// `setup` runs exactly once before any scenario starts; its value becomes
/// the shared [`TestRunContext`] data. `teardown` runs exactly once after
/// every scenario has stopped, including after aborts and setup failures.
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    async fn setup(&self, _env: &EnvOverrides) -> Result<JsonValue, SetupError> {
        Ok(JsonValue::Null)
    }

    async fn teardown(&self, _context: &TestRunContext) -> Result<(), TeardownError> {
        Ok(())
    }
}

/// Lifecycle with no hooks
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLifecycle;

impl Lifecycle for NoopLifecycle {}

/// Run `setup` under a time limit, converting panics into errors
pub async fn guarded_setup(
    lifecycle: &dyn Lifecycle,
    env: &EnvOverrides,
    limit: Duration,
) -> Result<JsonValue, SetupError> {
    info!("Running setup");
    let call = AssertUnwindSafe(lifecycle.setup(env)).catch_unwind();
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(payload)) => Err(SetupError::Panicked(panic_message(&*payload))),
        Err(_) => Err(SetupError::Timeout(limit)),
    }
}

/// Run `teardown` under a time limit; failures are logged and returned
pub async fn guarded_teardown(
    lifecycle: &dyn Lifecycle,
    context: &TestRunContext,
    limit: Duration,
) -> Result<(), TeardownError> {
    info!("Running teardown");
    let call = AssertUnwindSafe(lifecycle.teardown(context)).catch_unwind();
    let result = match tokio::time::timeout(limit, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(payload)) => Err(TeardownError::Panicked(panic_message(&*payload))),
        Err(_) => Err(TeardownError::Timeout(limit)),
    };
    if let Err(e) = &result {
        warn!(error = %e, "Teardown failed");
    }
    result
}
