//! Virtual-user worker
//!
//! A worker runs the scenario's iteration routine in a loop until it is
//! retired by the scheduler. Iterations never overlap within one worker.
//! Every iteration is guarded: errors, timeouts and panics are recorded as
//! metrics and the loop carries on.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stampede_core::{EnvOverrides, IterationError, TagSet, TestRunContext, ThinkTime};
use stampede_metrics::{names, MetricsRegistry, MetricsResult};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// The user-supplied routine executed once per iteration
#[async_trait]
pub trait Iteration: Send + Sync + 'static {
    async fn run(&self, ctx: IterationContext) -> Result<(), IterationError>;
}

/// [`Iteration`] backed by an async closure, see [`iteration_fn`]
pub struct FnIteration<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Iteration for FnIteration<F>
where
    F: Fn(IterationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), IterationError>> + Send + 'static,
{
    async fn run(&self, ctx: IterationContext) -> Result<(), IterationError> {
        (self.f)(ctx).await
    }
}

/// Wrap an async closure as an iteration routine
///
/// ```ignore
/// let iteration = iteration_fn(|ctx| async move {
///     ctx.add_counter("orders", 1.0, &TagSet::new())?;
///     Ok(())
/// });
/// ```
pub fn iteration_fn<F, Fut>(f: F) -> FnIteration<F>
where
    F: Fn(IterationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), IterationError>> + Send + 'static,
{
    FnIteration { f }
}

/// Per-scenario data shared by all of its workers
#[derive(Debug)]
pub(crate) struct ScenarioScope {
    pub(crate) name: String,
    /// Static scenario tags plus `scenario=<name>`
    pub(crate) tags: TagSet,
    /// Run environment with the scenario overrides layered on top
    pub(crate) env: EnvOverrides,
}

impl ScenarioScope {
    pub(crate) fn new(name: &str, tags: &TagSet, env: EnvOverrides) -> Self {
        Self {
            name: name.to_string(),
            tags: tags.clone().with(names::tags::SCENARIO, name),
            env,
        }
    }
}

/// Everything an iteration can see
///
/// Cheap to clone; all shared state sits behind `Arc`s.
#[derive(Clone)]
pub struct IterationContext {
    vu_id: u64,
    iteration: u64,
    scope: Arc<ScenarioScope>,
    run: Arc<TestRunContext>,
    metrics: Arc<MetricsRegistry>,
    rng: Arc<Mutex<StdRng>>,
}

impl IterationContext {
    /// Unique id of the virtual user running this iteration
    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    /// Zero-based iteration counter of this virtual user
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn scenario(&self) -> &str {
        &self.scope.name
    }

    /// Tags attached to every sample emitted through this context
    pub fn tags(&self) -> &TagSet {
        &self.scope.tags
    }

    /// The context produced by setup
    pub fn run(&self) -> &TestRunContext {
        &self.run
    }

    /// Environment lookup; scenario overrides shadow the run environment
    pub fn env(&self, name: &str) -> Option<&str> {
        self.scope.env.get(name)
    }

    pub fn env_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.scope.env.get_or(name, default)
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn add_counter(&self, name: &str, delta: f64, tags: &TagSet) -> MetricsResult<()> {
        self.metrics.add_counter(name, delta, &self.tagged(tags))
    }

    pub fn add_rate(&self, name: &str, hit: bool, tags: &TagSet) -> MetricsResult<()> {
        self.metrics.add_rate(name, hit, &self.tagged(tags))
    }

    pub fn add_trend(&self, name: &str, value: f64, tags: &TagSet) -> MetricsResult<()> {
        self.metrics.add_trend(name, value, &self.tagged(tags))
    }

    pub fn set_gauge(&self, name: &str, value: f64, tags: &TagSet) -> MetricsResult<()> {
        self.metrics.set_gauge(name, value, &self.tagged(tags))
    }

    /// Record a named assertion on the `checks` rate and return its outcome
    pub fn check(&self, name: &str, passed: bool, tags: &TagSet) -> bool {
        let tags = tags.clone().with(names::tags::CHECK, name);
        if let Err(e) = self.add_rate(names::CHECKS, passed, &tags) {
            warn!(check = name, error = %e, "Failed to record check");
        }
        passed
    }

    /// Uniform integer in `[low, high]`; bounds may be given in either order
    pub fn random_int(&self, low: i64, high: i64) -> i64 {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        self.rng.lock().random_range(low..=high)
    }

    /// Random alphanumeric string of `len` characters
    pub fn random_string(&self, len: usize) -> String {
        let mut rng = self.rng.lock();
        (0..len)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect()
    }

    /// `true` with probability `p`, clamped to `[0, 1]`
    pub fn random_bool(&self, p: f64) -> bool {
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        self.rng.lock().random_bool(p)
    }

    /// Borrow the worker's seeded generator
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        f(&mut self.rng.lock())
    }

    fn tagged(&self, tags: &TagSet) -> TagSet {
        if tags.is_empty() {
            self.scope.tags.clone()
        } else {
            self.scope.tags.merged(tags)
        }
    }
}

impl std::fmt::Debug for IterationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterationContext")
            .field("vu_id", &self.vu_id)
            .field("iteration", &self.iteration)
            .field("scenario", &self.scope.name)
            .finish()
    }
}

/// Derive a per-worker generator seed from the run seed
pub(crate) fn worker_seed(run_seed: u64, vu_id: u64) -> u64 {
    run_seed ^ vu_id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Render a panic payload for logs and error messages
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// One virtual user; consumed by [`Worker::run`]
pub(crate) struct Worker {
    pub(crate) vu_id: u64,
    pub(crate) scope: Arc<ScenarioScope>,
    pub(crate) routine: Arc<dyn Iteration>,
    pub(crate) run: Arc<TestRunContext>,
    pub(crate) metrics: Arc<MetricsRegistry>,
    pub(crate) think_time: ThinkTime,
    pub(crate) iteration_timeout: Option<Duration>,
    pub(crate) retire: watch::Receiver<bool>,
    pub(crate) iterations_started: Arc<AtomicU64>,
    pub(crate) seed: u64,
}

impl Worker {
    pub(crate) async fn run(mut self) {
        let rng = Arc::new(Mutex::new(StdRng::seed_from_u64(worker_seed(
            self.seed, self.vu_id,
        ))));
        debug!(vu = self.vu_id, scenario = %self.scope.name, "Worker started");

        let mut iteration = 0u64;
        while !self.is_retired() {
            self.iterations_started.fetch_add(1, Ordering::Relaxed);
            let ctx = IterationContext {
                vu_id: self.vu_id,
                iteration,
                scope: Arc::clone(&self.scope),
                run: Arc::clone(&self.run),
                metrics: Arc::clone(&self.metrics),
                rng: Arc::clone(&rng),
            };

            let started = Instant::now();
            let outcome = self.guarded(ctx).await;
            self.record(&outcome, started.elapsed());
            iteration += 1;

            let pause = self.think_time.sample(&mut *rng.lock());
            if !self.pause(pause).await {
                break;
            }
        }

        debug!(
            vu = self.vu_id,
            scenario = %self.scope.name,
            iterations = iteration,
            "Worker retired"
        );
    }

    /// Run one iteration under the timeout and panic guard
    async fn guarded(&self, ctx: IterationContext) -> Result<(), IterationError> {
        let call = AssertUnwindSafe(self.routine.run(ctx)).catch_unwind();
        let result = match self.iteration_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => return Err(IterationError::timeout(limit)),
            },
            None => call.await,
        };
        match result {
            Ok(outcome) => outcome,
            Err(payload) => Err(IterationError::panicked(panic_message(&*payload))),
        }
    }

    fn record(&self, outcome: &Result<(), IterationError>, elapsed: Duration) {
        let tags = &self.scope.tags;
        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        if let Err(e) = self.metrics.add_counter(names::ITERATIONS, 1.0, tags) {
            warn!(error = %e, "Failed to record iteration");
        }
        if let Err(e) = self
            .metrics
            .add_trend(names::ITERATION_DURATION, duration_ms, tags)
        {
            warn!(error = %e, "Failed to record iteration duration");
        }

        if let Err(err) = outcome {
            trace!(vu = self.vu_id, scenario = %self.scope.name, error = %err, "Iteration failed");
            let tags = tags
                .clone()
                .with(names::tags::ERROR_KIND, err.kind().as_str());
            if let Err(e) = self.metrics.add_counter(names::ITERATION_ERRORS, 1.0, &tags) {
                warn!(error = %e, "Failed to record iteration error");
            }
        }
    }

    /// Think time between iterations; `false` once the worker is retired
    async fn pause(&mut self, delay: Duration) -> bool {
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return !self.is_retired();
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => !self.is_retired(),
            _ = retired(&mut self.retire) => false,
        }
    }

    fn is_retired(&self) -> bool {
        // a dropped sender means the scheduler let go of this worker
        *self.retire.borrow() || self.retire.has_changed().is_err()
    }
}

async fn retired(retire: &mut watch::Receiver<bool>) {
    loop {
        let flagged = *retire.borrow_and_update();
        if flagged || retire.changed().await.is_err() {
            return;
        }
    }
}
