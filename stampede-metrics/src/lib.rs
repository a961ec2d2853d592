//! Metrics aggregation for Stampede
//!
//! This crate provides the thread-safe metrics registry shared by every
//! virtual user of a run. Samples are aggregated per (name, tag set) series
//! as they arrive; snapshots can be taken at any time and filtered by tags.

pub mod digest;
pub mod errors;
pub mod names;
pub mod registry;
pub mod series;
pub mod snapshot;

// Re-export main types for convenience
pub use digest::TrendDigest;
pub use errors::{MetricsError, MetricsResult};
pub use registry::{validate_metric_name, MetricsRegistry, Sample, SampleValue};
pub use series::{MetricKind, SeriesValue};
pub use snapshot::{FamilySnapshot, MetricSummary, MetricsSnapshot, TrendStat};
