//! Threshold parsing and evaluation
//!
//! A threshold pairs a metric selector (name plus optional tag filter) with
//! a predicate over one statistic of the selected series. Two notations are
//! accepted and produce the same [`Threshold`]:
//!
//! - expression form: `percentile(95)(http_req_duration{endpoint=debts}) < 500`
//! - configuration form: selector `http_req_duration{endpoint:debts}` with
//!   predicate `p(95)<500`
//!
//! Evaluation runs against a [`stampede_metrics::MetricsSnapshot`] and yields
//! one [`ThresholdVerdict`] per threshold.

pub mod error;
pub mod evaluator;
pub mod parser;
pub mod threshold;

pub use error::{ThresholdError, ThresholdResult};
pub use evaluator::{Evaluation, ThresholdSet};
pub use threshold::{Operator, Predicate, Selector, Statistic, Threshold, ThresholdVerdict};
