//! Scenario scheduler
//!
//! One task owns every scenario's state. On each tick it compares the
//! executor's desired concurrency with the live worker pool and spawns or
//! retires workers to close the gap. Retirement is advisory: a retired worker
//! finishes its current iteration and exits. Once a scenario's stages are
//! over it drains for up to its graceful-stop window; stragglers are then
//! aborted.

use serde::Serialize;
use stampede_core::{ExecutorKind, ScenarioSpec, ScenarioState, TagSet, TestRunContext};
use stampede_metrics::{names, MetricsRegistry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::signal::{AbortReason, AbortSignal};
use crate::worker::{Iteration, ScenarioScope, Worker};

/// Default reconciliation period
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Live view of one scenario, published every tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioStatus {
    pub name: String,
    pub state: ScenarioState,
    /// Workers currently asked to keep iterating
    pub active_workers: usize,
    /// Retired workers still finishing their last iteration
    pub retiring_workers: usize,
    pub desired_workers: u32,
}

impl ScenarioStatus {
    /// Worker tasks still running, retired or not
    pub fn live_workers(&self) -> usize {
        self.active_workers + self.retiring_workers
    }
}

/// End-of-run account of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub executor: ExecutorKind,
    #[serde(rename = "state")]
    pub final_state: ScenarioState,
    pub peak_workers: usize,
    /// Workers aborted because they outlived the graceful-stop window
    pub forced_stops: usize,
    pub iterations_started: u64,
}

/// Outcome of [`Scheduler::run`]
#[derive(Debug, Clone, Default)]
pub struct SchedulerReport {
    pub scenarios: Vec<ScenarioReport>,
    pub abort: Option<AbortReason>,
}

impl SchedulerReport {
    /// Report for a run whose scenarios never started
    pub fn not_started(scenarios: &[ScenarioSpec]) -> Self {
        Self {
            scenarios: scenarios
                .iter()
                .map(|spec| ScenarioReport {
                    name: spec.name.clone(),
                    executor: spec.executor.kind(),
                    final_state: ScenarioState::Pending,
                    peak_workers: 0,
                    forced_stops: 0,
                    iterations_started: 0,
                })
                .collect(),
            abort: None,
        }
    }

    pub fn forced_stops(&self) -> usize {
        self.scenarios.iter().map(|s| s.forced_stops).sum()
    }
}

struct WorkerHandle {
    vu_id: u64,
    retire: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    fn retire(&self) {
        // the worker may already be gone
        let _ = self.retire.send(true);
    }
}

/// Shared inputs for spawning workers
struct SpawnContext<'a> {
    routine: &'a Arc<dyn Iteration>,
    run: &'a Arc<TestRunContext>,
    seed: u64,
    next_vu: &'a mut u64,
}

struct ScenarioRunner {
    spec: ScenarioSpec,
    scope: Arc<ScenarioScope>,
    metrics: Arc<MetricsRegistry>,
    state: ScenarioState,
    /// Non-retired workers in spawn order
    workers: Vec<WorkerHandle>,
    retiring: Vec<WorkerHandle>,
    started_at: Option<Instant>,
    drain_deadline: Option<Instant>,
    desired: u32,
    peak: usize,
    forced_stops: usize,
    iterations_started: Arc<AtomicU64>,
}

impl ScenarioRunner {
    fn new(spec: ScenarioSpec, run: &TestRunContext, metrics: Arc<MetricsRegistry>) -> Self {
        let env = run.env().layered(&spec.env_overrides);
        let scope = Arc::new(ScenarioScope::new(&spec.name, &spec.tags, env));
        Self {
            spec,
            scope,
            metrics,
            state: ScenarioState::Pending,
            workers: Vec::new(),
            retiring: Vec::new(),
            started_at: None,
            drain_deadline: None,
            desired: 0,
            peak: 0,
            forced_stops: 0,
            iterations_started: Arc::new(AtomicU64::new(0)),
        }
    }

    fn live(&self) -> usize {
        self.workers.len() + self.retiring.len()
    }

    /// Advance this scenario; returns a fault description if a worker died
    async fn tick(
        &mut self,
        now: Instant,
        run_start: Instant,
        spawn: &mut SpawnContext<'_>,
    ) -> Option<String> {
        let fault = self.reap().await;

        if self.state == ScenarioState::Pending {
            let scheduled = run_start + self.spec.start_offset;
            if now < scheduled {
                return fault;
            }
            info!(scenario = %self.spec.name, executor = %self.spec.executor.kind(), "Scenario started");
            self.started_at = Some(scheduled);
            self.state = self.spec.executor.phase_at(Duration::ZERO);
        }

        if self.state.is_active() {
            let local = now.saturating_duration_since(self.started_at.unwrap_or(now));
            if local >= self.spec.executor.total_duration() {
                self.begin_drain(now);
            } else {
                self.state = self.spec.executor.phase_at(local);
                self.desired = self.spec.executor.desired_workers(local);
                self.reconcile(spawn);
            }
        }

        if self.state == ScenarioState::Draining {
            if self.live() == 0 {
                self.stop("drained");
            } else if self.drain_deadline.is_some_and(|deadline| now >= deadline) {
                let forced = self.abort_all().await;
                warn!(
                    scenario = %self.spec.name,
                    workers = forced,
                    "Graceful stop window elapsed; aborting remaining workers"
                );
                self.record_forced_stops(forced);
                self.stop("graceful stop elapsed");
            }
        }

        self.peak = self.peak.max(self.live());
        self.publish_gauge();
        fault
    }

    /// Spawn the deficit or retire the excess, most recent first
    fn reconcile(&mut self, spawn: &mut SpawnContext<'_>) {
        let desired = self.desired as usize;
        while self.workers.len() < desired {
            let handle = self.spawn_worker(spawn);
            self.workers.push(handle);
        }
        while self.workers.len() > desired {
            if let Some(handle) = self.workers.pop() {
                debug!(scenario = %self.spec.name, vu = handle.vu_id, "Retiring worker");
                handle.retire();
                self.retiring.push(handle);
            }
        }
    }

    fn spawn_worker(&self, spawn: &mut SpawnContext<'_>) -> WorkerHandle {
        *spawn.next_vu += 1;
        let vu_id = *spawn.next_vu;
        let (retire, retire_rx) = watch::channel(false);
        let worker = Worker {
            vu_id,
            scope: Arc::clone(&self.scope),
            routine: Arc::clone(spawn.routine),
            run: Arc::clone(spawn.run),
            metrics: Arc::clone(&self.metrics),
            think_time: self.spec.think_time,
            iteration_timeout: self.spec.iteration_timeout,
            retire: retire_rx,
            iterations_started: Arc::clone(&self.iterations_started),
            seed: spawn.seed,
        };
        WorkerHandle {
            vu_id,
            retire,
            join: tokio::spawn(worker.run()),
        }
    }

    fn begin_drain(&mut self, now: Instant) {
        info!(
            scenario = %self.spec.name,
            workers = self.live(),
            graceful_stop = ?self.spec.graceful_stop,
            "Scenario stages complete; draining"
        );
        self.desired = 0;
        for handle in self.workers.drain(..) {
            handle.retire();
            self.retiring.push(handle);
        }
        self.drain_deadline = Some(now + self.spec.graceful_stop);
        self.state = ScenarioState::Draining;
    }

    /// Collect finished workers; a panic outside the iteration guard is a fault
    async fn reap(&mut self) -> Option<String> {
        let mut fault = None;
        for pool in [&mut self.workers, &mut self.retiring] {
            let mut index = 0;
            while index < pool.len() {
                if !pool[index].join.is_finished() {
                    index += 1;
                    continue;
                }
                let handle = pool.swap_remove(index);
                if let Err(e) = handle.join.await {
                    if e.is_panic() {
                        let message = format!(
                            "worker {} of scenario '{}' panicked outside its iteration",
                            handle.vu_id, self.spec.name
                        );
                        error!(scenario = %self.spec.name, vu = handle.vu_id, "{}", message);
                        fault.get_or_insert(message);
                    }
                }
            }
        }
        fault
    }

    /// Abort every live worker and wait for the tasks to finish
    async fn abort_all(&mut self) -> usize {
        let handles: Vec<WorkerHandle> = self
            .workers
            .drain(..)
            .chain(self.retiring.drain(..))
            .collect();
        let mut aborted = 0;
        for handle in &handles {
            if !handle.join.is_finished() {
                handle.join.abort();
                aborted += 1;
            }
        }
        for handle in handles {
            let _ = handle.join.await;
        }
        aborted
    }

    fn stop(&mut self, cause: &str) {
        if self.state != ScenarioState::Stopped {
            info!(
                scenario = %self.spec.name,
                iterations = self.iterations_started.load(Ordering::Relaxed),
                "Scenario stopped ({})",
                cause
            );
        }
        self.desired = 0;
        self.state = ScenarioState::Stopped;
    }

    fn record_forced_stops(&mut self, forced: usize) {
        self.forced_stops += forced;
        if forced > 0 {
            self.counter(names::FORCED_STOPS, forced as f64);
        }
    }

    fn counter(&self, name: &str, delta: f64) {
        if let Err(e) = self.metrics.add_counter(name, delta, &self.scope.tags) {
            warn!(metric = name, error = %e, "Failed to record scheduler metric");
        }
    }

    fn publish_gauge(&self) {
        let tags = TagSet::new().with(names::tags::SCENARIO, self.spec.name.as_str());
        if let Err(e) = self
            .metrics
            .set_gauge(names::ACTIVE_WORKERS, self.live() as f64, &tags)
        {
            warn!(error = %e, "Failed to publish active worker gauge");
        }
    }

    fn status(&self) -> ScenarioStatus {
        ScenarioStatus {
            name: self.spec.name.clone(),
            state: self.state,
            active_workers: self.workers.len(),
            retiring_workers: self.retiring.len(),
            desired_workers: self.desired,
        }
    }

    fn report(&self) -> ScenarioReport {
        ScenarioReport {
            name: self.spec.name.clone(),
            executor: self.spec.executor.kind(),
            final_state: self.state,
            peak_workers: self.peak,
            forced_stops: self.forced_stops,
            iterations_started: self.iterations_started.load(Ordering::Relaxed),
        }
    }
}

/// Drives every scenario of a run from a single task
pub struct Scheduler {
    scenarios: Vec<ScenarioSpec>,
    routine: Arc<dyn Iteration>,
    metrics: Arc<MetricsRegistry>,
    abort: AbortSignal,
    tick: Duration,
    seed: u64,
    status: watch::Sender<Vec<ScenarioStatus>>,
}

impl Scheduler {
    pub fn new(
        scenarios: Vec<ScenarioSpec>,
        routine: Arc<dyn Iteration>,
        metrics: Arc<MetricsRegistry>,
        abort: AbortSignal,
    ) -> Self {
        let (status, _) = watch::channel(Vec::new());
        Self {
            scenarios,
            routine,
            metrics,
            abort,
            tick: DEFAULT_TICK,
            seed: 0,
            status,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        if !tick.is_zero() {
            self.tick = tick;
        }
        self
    }

    /// Run seed from which every worker derives its generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Subscribe to per-tick scenario status
    pub fn status(&self) -> watch::Receiver<Vec<ScenarioStatus>> {
        self.status.subscribe()
    }

    /// Run until every scenario has stopped or the run is aborted
    pub async fn run(self, context: Arc<TestRunContext>) -> SchedulerReport {
        let mut runners: Vec<ScenarioRunner> = self
            .scenarios
            .iter()
            .cloned()
            .map(|spec| ScenarioRunner::new(spec, &context, Arc::clone(&self.metrics)))
            .collect();

        let mut next_vu = 0u64;
        let run_start = Instant::now();
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            scenarios = runners.len(),
            tick = ?self.tick,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.abort.aborted() => {}
            }

            if let Some(reason) = self.abort.reason() {
                warn!(reason = %reason, "Run aborted; stopping all scenarios");
                for runner in &mut runners {
                    let forced = runner.abort_all().await;
                    runner.record_forced_stops(forced);
                    runner.stop("run aborted");
                    runner.publish_gauge();
                }
                self.publish(&runners);
                break;
            }

            let now = Instant::now();
            let mut spawn = SpawnContext {
                routine: &self.routine,
                run: &context,
                seed: self.seed,
                next_vu: &mut next_vu,
            };
            for runner in &mut runners {
                if let Some(fault) = runner.tick(now, run_start, &mut spawn).await {
                    self.abort.abort(AbortReason::SchedulerFault(fault));
                }
            }
            self.publish(&runners);

            if runners.iter().all(|r| r.state.is_terminal()) {
                break;
            }
        }

        info!(elapsed = ?run_start.elapsed(), "Scheduler finished");
        SchedulerReport {
            scenarios: runners.iter().map(ScenarioRunner::report).collect(),
            abort: self.abort.reason(),
        }
    }

    fn publish(&self, runners: &[ScenarioRunner]) {
        self.status
            .send_replace(runners.iter().map(ScenarioRunner::status).collect());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::iteration_fn;
    use stampede_core::{EnvOverrides, IterationError, Stage};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn sleeping(duration: Duration) -> Arc<dyn Iteration> {
        Arc::new(iteration_fn(move |_ctx| async move {
            tokio::time::sleep(duration).await;
            Ok::<(), IterationError>(())
        }))
    }

    fn start(
        scenarios: Vec<ScenarioSpec>,
        routine: Arc<dyn Iteration>,
        abort: AbortSignal,
    ) -> (
        Arc<MetricsRegistry>,
        watch::Receiver<Vec<ScenarioStatus>>,
        JoinHandle<SchedulerReport>,
    ) {
        let metrics = Arc::new(MetricsRegistry::new());
        let scheduler = Scheduler::new(scenarios, routine, Arc::clone(&metrics), abort);
        let status = scheduler.status();
        let context = Arc::new(TestRunContext::empty(EnvOverrides::default()));
        (metrics, status, tokio::spawn(scheduler.run(context)))
    }

    fn status_of(status: &watch::Receiver<Vec<ScenarioStatus>>, name: &str) -> ScenarioStatus {
        status
            .borrow()
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_constant_executor_single_worker_then_zero() {
        let t0 = Instant::now();
        let spec = ScenarioSpec::constant("smoke", 1, secs(10)).with_graceful_stop(secs(5));
        let (metrics, status, handle) = start(
            vec![spec],
            sleeping(Duration::from_millis(250)),
            AbortSignal::new(),
        );

        for at in [1, 5, 9] {
            tokio::time::sleep_until(t0 + secs(at)).await;
            let current = status_of(&status, "smoke");
            assert_eq!(current.live_workers(), 1, "at {}s", at);
            assert_eq!(current.state, ScenarioState::Steady);
        }

        let report = handle.await.unwrap();
        assert!(t0.elapsed() <= secs(15));
        assert_eq!(status_of(&status, "smoke").live_workers(), 0);

        let smoke = &report.scenarios[0];
        assert_eq!(smoke.final_state, ScenarioState::Stopped);
        assert_eq!(smoke.peak_workers, 1);
        assert_eq!(smoke.forced_stops, 0);
        assert!((40..=41).contains(&smoke.iterations_started));
        assert!(report.abort.is_none());

        let snapshot = metrics.snapshot().unwrap();
        let gauge = snapshot
            .aggregate(names::ACTIVE_WORKERS, &TagSet::new().with("scenario", "smoke"))
            .unwrap();
        assert_eq!(gauge.value(), Some(0.0));
        assert_eq!(gauge.max(), Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_stop_window_forces_abort() {
        let t0 = Instant::now();
        let spec = ScenarioSpec::constant("stuck", 2, secs(2)).with_graceful_stop(secs(1));
        let (metrics, _status, handle) =
            start(vec![spec], sleeping(secs(60)), AbortSignal::new());

        let report = handle.await.unwrap();
        let elapsed = t0.elapsed();
        assert!(elapsed >= secs(3) && elapsed < secs(3) + DEFAULT_TICK * 2);

        let stuck = &report.scenarios[0];
        assert_eq!(stuck.final_state, ScenarioState::Stopped);
        assert_eq!(stuck.forced_stops, 2);
        assert_eq!(stuck.iterations_started, 2);
        assert_eq!(report.forced_stops(), 2);

        let snapshot = metrics.snapshot().unwrap();
        let forced = snapshot
            .aggregate(names::FORCED_STOPS, &TagSet::new())
            .and_then(|v| v.value());
        assert_eq!(forced, Some(2.0));
        // aborted iterations never complete
        assert!(snapshot.aggregate(names::ITERATIONS, &TagSet::new()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramping_follows_stages() {
        let t0 = Instant::now();
        let spec = ScenarioSpec::ramping(
            "load",
            0,
            vec![Stage::new(secs(10), 10), Stage::new(secs(10), 0)],
        );
        let (_metrics, status, handle) = start(
            vec![spec],
            sleeping(Duration::from_millis(100)),
            AbortSignal::new(),
        );

        tokio::time::sleep_until(t0 + Duration::from_millis(5050)).await;
        let ramp_up = status_of(&status, "load");
        assert_eq!(ramp_up.state, ScenarioState::Ramping);
        assert_eq!(ramp_up.desired_workers, 5);
        assert_eq!(ramp_up.active_workers, 5);

        tokio::time::sleep_until(t0 + Duration::from_millis(15050)).await;
        let ramp_down = status_of(&status, "load");
        assert_eq!(ramp_down.desired_workers, 5);
        assert_eq!(ramp_down.active_workers, 5);

        let report = handle.await.unwrap();
        let load = &report.scenarios[0];
        assert_eq!(load.peak_workers, 10);
        assert_eq!(load.forced_stops, 0);
        assert_eq!(load.final_state, ScenarioState::Stopped);
        assert!(t0.elapsed() < secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_offset_delays_scenario() {
        let t0 = Instant::now();
        let first = ScenarioSpec::constant("first", 1, secs(5));
        let second = ScenarioSpec::constant("second", 2, secs(1)).with_start_offset(secs(2));
        let (_metrics, status, handle) = start(
            vec![first, second],
            sleeping(Duration::from_millis(100)),
            AbortSignal::new(),
        );

        tokio::time::sleep_until(t0 + secs(1)).await;
        let pending = status_of(&status, "second");
        assert_eq!(pending.state, ScenarioState::Pending);
        assert_eq!(pending.live_workers(), 0);
        assert_eq!(status_of(&status, "first").live_workers(), 1);

        tokio::time::sleep_until(t0 + Duration::from_millis(2550)).await;
        assert_eq!(status_of(&status, "second").active_workers, 2);

        let report = handle.await.unwrap();
        assert!(report
            .scenarios
            .iter()
            .all(|s| s.final_state == ScenarioState::Stopped));
        assert_eq!(report.scenarios[0].peak_workers, 1);
        assert_eq!(report.scenarios[1].peak_workers, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_abort_stops_everything() {
        let t0 = Instant::now();
        let abort = AbortSignal::new();
        let spec = ScenarioSpec::constant("soak", 3, secs(600));
        let (_metrics, status, handle) = start(vec![spec], sleeping(secs(1)), abort.clone());

        tokio::time::sleep_until(t0 + Duration::from_millis(2500)).await;
        abort.abort(AbortReason::Interrupted);

        let report = handle.await.unwrap();
        assert!(t0.elapsed() < Duration::from_millis(2600));
        assert_eq!(report.abort, Some(AbortReason::Interrupted));

        let soak = &report.scenarios[0];
        assert_eq!(soak.final_state, ScenarioState::Stopped);
        assert_eq!(soak.forced_stops, 3);
        assert_eq!(status_of(&status, "soak").live_workers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_panics_are_not_scheduler_faults() {
        let routine: Arc<dyn Iteration> = Arc::new(iteration_fn(|_ctx| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            if true {
                panic!("iteration bug");
            }
            Ok(())
        }));
        let spec = ScenarioSpec::constant("buggy", 1, secs(2));
        let (metrics, _status, handle) = start(vec![spec], routine, AbortSignal::new());

        let report = handle.await.unwrap();
        assert!(report.abort.is_none());

        let snapshot = metrics.snapshot().unwrap();
        let panicked = snapshot
            .aggregate(
                names::ITERATION_ERRORS,
                &TagSet::new().with("error_kind", "panicked"),
            )
            .and_then(|v| v.value());
        assert_eq!(panicked, Some(4.0));
    }
}
