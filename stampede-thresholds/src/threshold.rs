//! Threshold types and single-threshold evaluation

use crate::error::{ThresholdError, ThresholdResult};
use crate::parser;
use serde::Serialize;
use stampede_core::TagSet;
use stampede_metrics::{MetricKind, MetricsSnapshot, SeriesValue};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Statistic computed over the selected series
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statistic {
    Percentile(f64),
    Rate,
    Count,
    Avg,
    Min,
    Max,
    Med,
    Value,
}

impl Statistic {
    /// Whether the statistic is defined for a metric kind
    pub fn applies_to(&self, kind: MetricKind) -> bool {
        match self {
            Statistic::Count => kind != MetricKind::Gauge,
            Statistic::Rate => matches!(kind, MetricKind::Counter | MetricKind::Rate),
            Statistic::Value => kind != MetricKind::Trend,
            Statistic::Min | Statistic::Max => {
                matches!(kind, MetricKind::Trend | MetricKind::Gauge)
            }
            Statistic::Percentile(_) | Statistic::Avg | Statistic::Med => {
                kind == MetricKind::Trend
            }
        }
    }

    /// Value used when the selector matches no series
    ///
    /// Counts and rates of nothing are zero; distribution statistics have
    /// no data.
    fn empty_value(&self) -> Option<f64> {
        match self {
            Statistic::Count | Statistic::Rate => Some(0.0),
            _ => None,
        }
    }

    fn compute(&self, value: &SeriesValue, elapsed: Duration) -> Option<f64> {
        match self {
            Statistic::Percentile(p) => value.percentile(*p),
            Statistic::Rate => value.rate(elapsed),
            Statistic::Count => value.count(),
            Statistic::Avg => value.avg(),
            Statistic::Min => value.min(),
            Statistic::Max => value.max(),
            Statistic::Med => value.percentile(50.0),
            Statistic::Value => value.value(),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Percentile(p) => write!(f, "p({})", p),
            Statistic::Rate => f.write_str("rate"),
            Statistic::Count => f.write_str("count"),
            Statistic::Avg => f.write_str("avg"),
            Statistic::Min => f.write_str("min"),
            Statistic::Max => f.write_str("max"),
            Statistic::Med => f.write_str("med"),
            Statistic::Value => f.write_str("value"),
        }
    }
}

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    pub fn apply(&self, observed: f64, bound: f64) -> bool {
        match self {
            Operator::Lt => observed < bound,
            Operator::Le => observed <= bound,
            Operator::Gt => observed > bound,
            Operator::Ge => observed >= bound,
            Operator::Eq => observed == bound,
            Operator::Ne => observed != bound,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric name with an optional tag filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub metric: String,
    pub tags: TagSet,
}

impl Selector {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            tags: TagSet::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }
}

/// Renders as `name` or `name{key:value,...}`
impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.metric, self.tags)
    }
}

impl FromStr for Selector {
    type Err = ThresholdError;

    fn from_str(s: &str) -> ThresholdResult<Self> {
        parser::parse_selector(s)
    }
}

/// Statistic, operator and bound
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub statistic: Statistic,
    pub operator: Operator,
    pub bound: f64,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.statistic, self.operator, self.bound)
    }
}

impl FromStr for Predicate {
    type Err = ThresholdError;

    fn from_str(s: &str) -> ThresholdResult<Self> {
        parser::parse_predicate(s)
    }
}

/// A pass/fail predicate over an aggregated metric
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub selector: Selector,
    pub predicate: Predicate,
    /// Breaching aborts the run as soon as it is observed
    pub abort_on_breach: bool,
    /// Continuous evaluation starts this long after the run starts
    pub delay_abort_eval: Duration,
}

impl Threshold {
    pub fn new(selector: Selector, predicate: Predicate) -> Self {
        Self {
            selector,
            predicate,
            abort_on_breach: false,
            delay_abort_eval: Duration::ZERO,
        }
    }

    /// Parse the expression form, e.g. `rate(http_req_failed) < 0.01`
    pub fn parse(expression: &str) -> ThresholdResult<Self> {
        parser::parse_expression(expression)
    }

    /// Build from the configuration form: selector key plus predicate string
    pub fn from_config(selector: &str, predicate: &str) -> ThresholdResult<Self> {
        Ok(Self::new(selector.parse()?, predicate.parse()?))
    }

    pub fn with_abort_on_breach(mut self, delay: Duration) -> Self {
        self.abort_on_breach = true;
        self.delay_abort_eval = delay;
        self
    }

    /// Compute the observed statistic for the selected series
    ///
    /// `Ok(None)` means no data; that verdict passes.
    pub fn observe(&self, snapshot: &MetricsSnapshot) -> ThresholdResult<Option<f64>> {
        let statistic = self.predicate.statistic;
        if let Some(kind) = snapshot.kind(&self.selector.metric) {
            if !statistic.applies_to(kind) {
                return Err(ThresholdError::UnsupportedStatistic {
                    statistic: statistic.to_string(),
                    kind: kind.to_string(),
                    metric: self.selector.metric.clone(),
                });
            }
        }

        Ok(
            match snapshot.aggregate(&self.selector.metric, &self.selector.tags) {
                Some(value) => statistic.compute(&value, snapshot.elapsed()),
                None => statistic.empty_value(),
            },
        )
    }

    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdVerdict {
        let (observed, passed, error) = match self.observe(snapshot) {
            Ok(Some(observed)) => (
                Some(observed),
                self.predicate.operator.apply(observed, self.predicate.bound),
                None,
            ),
            Ok(None) => (None, true, None),
            Err(e) => (None, false, Some(e.to_string())),
        };

        ThresholdVerdict {
            selector: self.selector.to_string(),
            predicate: self.predicate.to_string(),
            observed,
            passed,
            abort_on_breach: self.abort_on_breach,
            error,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.selector, self.predicate)
    }
}

/// Outcome of one threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdVerdict {
    pub selector: String,
    pub predicate: String,
    pub observed: Option<f64>,
    pub passed: bool,
    pub abort_on_breach: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
