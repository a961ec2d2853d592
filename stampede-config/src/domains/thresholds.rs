//! Threshold configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use stampede_thresholds::{Threshold, ThresholdSet};
use std::collections::BTreeMap;
use std::time::Duration;

/// One predicate attached to a selector
///
/// Either a bare predicate string (`p(95)<500`) or an object that also
/// enables abort-on-breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdEntry {
    Predicate(String),
    Detailed(DetailedThreshold),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedThreshold {
    pub threshold: String,

    #[serde(default)]
    pub abort_on_fail: bool,

    #[serde(default, with = "humantime_serde")]
    pub delay_abort_eval: Duration,
}

impl ThresholdEntry {
    pub fn predicate(&self) -> &str {
        match self {
            ThresholdEntry::Predicate(p) => p,
            ThresholdEntry::Detailed(d) => &d.threshold,
        }
    }

    fn to_threshold(&self, selector: &str) -> ConfigResult<Threshold> {
        let threshold = Threshold::from_config(selector, self.predicate())?;
        Ok(match self {
            ThresholdEntry::Detailed(d) if d.abort_on_fail => {
                threshold.with_abort_on_breach(d.delay_abort_eval)
            }
            _ => threshold,
        })
    }
}

/// Selector string (`name` or `name{key:value}`) to its predicates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdsConfig(pub BTreeMap<String, Vec<ThresholdEntry>>);

impl ThresholdsConfig {
    pub fn add(&mut self, selector: impl Into<String>, entry: ThresholdEntry) {
        self.0.entry(selector.into()).or_default().push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse every entry into an evaluable threshold set
    pub fn to_threshold_set(&self) -> ConfigResult<ThresholdSet> {
        let mut set = ThresholdSet::default();
        for (selector, entries) in &self.0 {
            for entry in entries {
                set.push(entry.to_threshold(selector)?);
            }
        }
        Ok(set)
    }
}

impl Validatable for ThresholdsConfig {
    fn validate(&self) -> ConfigResult<()> {
        for (selector, entries) in &self.0 {
            if entries.is_empty() {
                return Err(self.validation_error(format!(
                    "selector '{}' has no predicates",
                    selector
                )));
            }
        }
        self.to_threshold_set().map(|_| ())
    }

    fn domain_name(&self) -> &'static str {
        "thresholds"
    }
}
