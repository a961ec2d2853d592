//! Evaluation of a whole threshold set

use crate::threshold::{Selector, Threshold, ThresholdVerdict};
use stampede_metrics::MetricsSnapshot;
use std::time::Duration;

/// Every threshold configured for a run
#[derive(Debug, Clone, Default)]
pub struct ThresholdSet {
    thresholds: Vec<Threshold>,
}

impl ThresholdSet {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        Self { thresholds }
    }

    pub fn push(&mut self, threshold: Threshold) {
        self.thresholds.push(threshold);
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.thresholds.iter()
    }

    /// Whether any threshold must be watched while the run is in progress
    pub fn has_abort_on_breach(&self) -> bool {
        self.thresholds.iter().any(|t| t.abort_on_breach)
    }

    /// Distinct selectors that carry a tag filter
    pub fn tagged_selectors(&self) -> Vec<&Selector> {
        let mut selectors: Vec<&Selector> = Vec::new();
        for threshold in &self.thresholds {
            let selector = &threshold.selector;
            if !selector.tags.is_empty() && !selectors.contains(&selector) {
                selectors.push(selector);
            }
        }
        selectors
    }

    /// End-of-run evaluation of every threshold
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> Evaluation {
        Evaluation {
            verdicts: self
                .thresholds
                .iter()
                .map(|t| t.evaluate(snapshot))
                .collect(),
        }
    }

    /// First abort-on-breach threshold that currently fails
    ///
    /// Thresholds whose `delay_abort_eval` has not yet elapsed at `elapsed`
    /// are skipped.
    pub fn first_abort_breach(
        &self,
        snapshot: &MetricsSnapshot,
        elapsed: Duration,
    ) -> Option<ThresholdVerdict> {
        self.thresholds
            .iter()
            .filter(|t| t.abort_on_breach && elapsed >= t.delay_abort_eval)
            .map(|t| t.evaluate(snapshot))
            .find(|verdict| !verdict.passed)
    }
}

impl FromIterator<Threshold> for ThresholdSet {
    fn from_iter<I: IntoIterator<Item = Threshold>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Verdicts of one evaluation; the run passes when all of them pass
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub verdicts: Vec<ThresholdVerdict>,
}

impl Evaluation {
    pub fn passed(&self) -> bool {
        self.verdicts.iter().all(|v| v.passed)
    }

    pub fn first_breach(&self) -> Option<&ThresholdVerdict> {
        self.verdicts.iter().find(|v| !v.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.verdicts.iter().filter(|v| !v.passed).count()
    }
}
