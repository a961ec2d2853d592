//! Thread-safe metrics registry shared by every worker of a run

use crate::errors::{MetricsError, MetricsResult};
use crate::series::{MetricKind, Series};
use crate::snapshot::{FamilySnapshot, MetricsSnapshot};
use ahash::AHashMap;
use parking_lot::RwLock;
use stampede_core::TagSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Value carried by a sample; the variant decides the metric kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Counter(f64),
    Gauge(f64),
    Rate(bool),
    Trend(f64),
}

impl SampleValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            SampleValue::Counter(_) => MetricKind::Counter,
            SampleValue::Gauge(_) => MetricKind::Gauge,
            SampleValue::Rate(_) => MetricKind::Rate,
            SampleValue::Trend(_) => MetricKind::Trend,
        }
    }
}

/// One observation emitted by a worker or the engine
#[derive(Debug, Clone)]
pub struct Sample {
    pub name: String,
    pub tags: TagSet,
    pub value: SampleValue,
    pub at: Instant,
}

impl Sample {
    pub fn new(name: impl Into<String>, value: SampleValue, tags: TagSet) -> Self {
        Self {
            name: name.into(),
            tags,
            value,
            at: Instant::now(),
        }
    }
}

#[derive(Debug)]
struct MetricFamily {
    kind: MetricKind,
    series: RwLock<AHashMap<TagSet, Arc<Series>>>,
}

impl MetricFamily {
    fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            series: RwLock::new(AHashMap::new()),
        }
    }

    fn series(&self, tags: &TagSet) -> MetricsResult<Arc<Series>> {
        if let Some(series) = self.series.read().get(tags) {
            return Ok(Arc::clone(series));
        }
        let mut guard = self.series.write();
        if let Some(series) = guard.get(tags) {
            return Ok(Arc::clone(series));
        }
        let series = Arc::new(Series::new(self.kind)?);
        guard.insert(tags.clone(), Arc::clone(&series));
        Ok(series)
    }
}

/// Aggregates samples into per-(name, tags) series as they arrive
///
/// All recording methods take `&self` and may be called from any number of
/// tasks at once. The first sample for a name fixes its kind; later samples
/// of another kind are rejected with [`MetricsError::KindMismatch`].
#[derive(Debug)]
pub struct MetricsRegistry {
    families: RwLock<AHashMap<String, Arc<MetricFamily>>>,
    started: Instant,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            families: RwLock::new(AHashMap::new()),
            started: Instant::now(),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started
    }

    /// Add `delta` (>= 0) to a counter
    pub fn add_counter(&self, name: &str, delta: f64, tags: &TagSet) -> MetricsResult<()> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(MetricsError::InvalidCounterDelta {
                name: name.to_string(),
                delta,
            });
        }
        match &*self.series(name, MetricKind::Counter, tags)? {
            Series::Counter(counter) => counter.add(delta),
            _ => unreachable!("family kind checked"),
        }
        Ok(())
    }

    /// Record one hit or miss on a rate
    pub fn add_rate(&self, name: &str, hit: bool, tags: &TagSet) -> MetricsResult<()> {
        match &*self.series(name, MetricKind::Rate, tags)? {
            Series::Rate(rate) => rate.add(hit),
            _ => unreachable!("family kind checked"),
        }
        Ok(())
    }

    pub fn set_gauge(&self, name: &str, value: f64, tags: &TagSet) -> MetricsResult<()> {
        self.set_gauge_at(name, value, tags, Instant::now())
    }

    /// Set a gauge with an explicit sample timestamp; the latest timestamp wins
    pub fn set_gauge_at(
        &self,
        name: &str,
        value: f64,
        tags: &TagSet,
        at: Instant,
    ) -> MetricsResult<()> {
        if !value.is_finite() {
            return Err(MetricsError::InvalidGaugeValue(value));
        }
        match &*self.series(name, MetricKind::Gauge, tags)? {
            Series::Gauge(gauge) => gauge.set(value, at),
            _ => unreachable!("family kind checked"),
        }
        Ok(())
    }

    /// Observe one value (>= 0) on a trend
    pub fn add_trend(&self, name: &str, value: f64, tags: &TagSet) -> MetricsResult<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(MetricsError::InvalidTrendValue(value));
        }
        match &*self.series(name, MetricKind::Trend, tags)? {
            Series::Trend(trend) => trend.record(value),
            _ => unreachable!("family kind checked"),
        }
    }

    pub fn record(&self, sample: Sample) -> MetricsResult<()> {
        match sample.value {
            SampleValue::Counter(delta) => self.add_counter(&sample.name, delta, &sample.tags),
            SampleValue::Gauge(value) => {
                self.set_gauge_at(&sample.name, value, &sample.tags, sample.at)
            }
            SampleValue::Rate(hit) => self.add_rate(&sample.name, hit, &sample.tags),
            SampleValue::Trend(value) => self.add_trend(&sample.name, value, &sample.tags),
        }
    }

    /// Kind bound to `name`, if any sample has been recorded for it
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.families.read().get(name).map(|family| family.kind)
    }

    /// Point-in-time view with elapsed time measured from registry creation
    pub fn snapshot(&self) -> MetricsResult<MetricsSnapshot> {
        self.snapshot_with_duration(self.started.elapsed())
    }

    /// Point-in-time view with an explicit elapsed time for throughput rates
    pub fn snapshot_with_duration(&self, elapsed: Duration) -> MetricsResult<MetricsSnapshot> {
        let families: Vec<(String, Arc<MetricFamily>)> = self
            .families
            .read()
            .iter()
            .map(|(name, family)| (name.clone(), Arc::clone(family)))
            .collect();

        let mut snapshot = MetricsSnapshot::new(elapsed);
        for (name, family) in families {
            let series: Vec<(TagSet, Arc<Series>)> = family
                .series
                .read()
                .iter()
                .map(|(tags, series)| (tags.clone(), Arc::clone(series)))
                .collect();

            let mut values = Vec::with_capacity(series.len());
            for (tags, series) in series {
                if let Some(value) = series.value()? {
                    values.push((tags, value));
                }
            }
            values.sort_by(|a, b| a.0.cmp(&b.0));
            snapshot.insert(
                name,
                FamilySnapshot {
                    kind: family.kind,
                    series: values,
                },
            );
        }
        Ok(snapshot)
    }

    fn series(&self, name: &str, kind: MetricKind, tags: &TagSet) -> MetricsResult<Arc<Series>> {
        let family = self.family(name, kind)?;
        family.series(tags)
    }

    fn family(&self, name: &str, kind: MetricKind) -> MetricsResult<Arc<MetricFamily>> {
        if let Some(family) = self.families.read().get(name) {
            return check_kind(name, family, kind);
        }
        validate_metric_name(name)?;
        let mut guard = self.families.write();
        let family = guard
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MetricFamily::new(kind)));
        check_kind(name, family, kind)
    }
}

fn check_kind(
    name: &str,
    family: &Arc<MetricFamily>,
    requested: MetricKind,
) -> MetricsResult<Arc<MetricFamily>> {
    if family.kind != requested {
        return Err(MetricsError::KindMismatch {
            name: name.to_string(),
            existing: family.kind,
            requested,
        });
    }
    Ok(Arc::clone(family))
}

/// Metric names are identifiers: `[A-Za-z_][A-Za-z0-9_]*`
pub fn validate_metric_name(name: &str) -> MetricsResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(MetricsError::InvalidName(name.to_string()))
    }
}
