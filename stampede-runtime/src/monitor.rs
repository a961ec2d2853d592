//! Continuous evaluation of abort-on-breach thresholds

use stampede_metrics::MetricsRegistry;
use stampede_thresholds::ThresholdSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::signal::{AbortReason, AbortSignal};

/// Periodically snapshots the registry and aborts the run on the first
/// abort-on-breach threshold that fails
pub struct ThresholdMonitor {
    thresholds: Arc<ThresholdSet>,
    metrics: Arc<MetricsRegistry>,
    abort: AbortSignal,
    interval: Duration,
    started: Instant,
}

impl ThresholdMonitor {
    pub fn new(
        thresholds: Arc<ThresholdSet>,
        metrics: Arc<MetricsRegistry>,
        abort: AbortSignal,
        interval: Duration,
    ) -> Self {
        Self {
            thresholds,
            metrics,
            abort,
            interval,
            started: Instant::now(),
        }
    }

    /// Measure elapsed time from `started` instead of construction
    pub fn with_start(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        if !self.thresholds.has_abort_on_breach() {
            return;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately; nothing has been recorded yet
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.abort.aborted() => return,
            }

            let elapsed = self.started.elapsed();
            let snapshot = match self.metrics.snapshot_with_duration(elapsed) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "Failed to snapshot metrics for threshold check");
                    continue;
                }
            };

            match self.thresholds.first_abort_breach(&snapshot, elapsed) {
                Some(verdict) => {
                    warn!(
                        selector = %verdict.selector,
                        predicate = %verdict.predicate,
                        observed = ?verdict.observed,
                        "Threshold breached; aborting run"
                    );
                    self.abort.abort(AbortReason::ThresholdBreach(verdict));
                    return;
                }
                None => debug!(elapsed = ?elapsed, "Abort-on-breach thresholds hold"),
            }
        }
    }
}
