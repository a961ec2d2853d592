//! Point-in-time views of the registry

use crate::errors::{MetricsError, MetricsResult};
use crate::series::{MetricKind, SeriesValue};
use serde::Serialize;
use stampede_core::TagSet;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// All series of one metric name
#[derive(Debug, Clone)]
pub struct FamilySnapshot {
    pub kind: MetricKind,
    pub series: Vec<(TagSet, SeriesValue)>,
}

/// Consistent copy of every metric at one instant
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    elapsed: Duration,
    families: BTreeMap<String, FamilySnapshot>,
}

impl MetricsSnapshot {
    pub fn new(elapsed: Duration) -> Self {
        Self {
            elapsed,
            families: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: String, family: FamilySnapshot) {
        self.families.insert(name, family);
    }

    /// Time covered by the snapshot; the denominator of counter rates
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn family(&self, name: &str) -> Option<&FamilySnapshot> {
        self.families.get(name)
    }

    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        self.families.get(name).map(|f| f.kind)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }

    /// Merge every series of `name` whose tags include all of `filter`
    ///
    /// Gauges merge to the most recent sample of the matching series, not to
    /// their sum; an untagged read of `active_workers` is the newest
    /// scenario's value. Filter on the `scenario` tag for per-scenario values.
    ///
    /// Returns `None` when the metric is unknown or no series matches.
    pub fn aggregate(&self, name: &str, filter: &TagSet) -> Option<SeriesValue> {
        let family = self.families.get(name)?;
        let mut merged: Option<SeriesValue> = None;
        for (tags, value) in &family.series {
            if !tags.contains_all(filter) {
                continue;
            }
            match merged.as_mut() {
                None => merged = Some(value.clone()),
                Some(acc) => {
                    // every series of a family shares its kind
                    if acc.merge(value).is_err() {
                        return None;
                    }
                }
            }
        }
        merged
    }

    /// Summary values of every metric, aggregated over all tags
    pub fn summarize(&self, trend_stats: &[TrendStat]) -> BTreeMap<String, MetricSummary> {
        self.families
            .keys()
            .filter_map(|name| {
                let summary = self.summarize_filtered(name, &TagSet::new(), trend_stats)?;
                Some((name.clone(), summary))
            })
            .collect()
    }

    /// Summary values of the series of `name` matching `filter`
    pub fn summarize_filtered(
        &self,
        name: &str,
        filter: &TagSet,
        trend_stats: &[TrendStat],
    ) -> Option<MetricSummary> {
        let value = self.aggregate(name, filter)?;
        Some(MetricSummary::from_value(
            value.kind(),
            &value,
            self.elapsed,
            trend_stats,
        ))
    }
}

/// Reported values of one metric in the run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub values: BTreeMap<String, f64>,
}

impl MetricSummary {
    fn from_value(
        kind: MetricKind,
        value: &SeriesValue,
        elapsed: Duration,
        trend_stats: &[TrendStat],
    ) -> Self {
        let mut values = BTreeMap::new();
        match value {
            SeriesValue::Counter { sum } => {
                values.insert("count".to_string(), *sum);
                values.insert("rate".to_string(), value.rate(elapsed).unwrap_or(0.0));
            }
            SeriesValue::Gauge {
                value: last,
                min,
                max,
                ..
            } => {
                values.insert("value".to_string(), *last);
                values.insert("min".to_string(), *min);
                values.insert("max".to_string(), *max);
            }
            SeriesValue::Rate { hits, total } => {
                values.insert("rate".to_string(), value.rate(elapsed).unwrap_or(0.0));
                values.insert("passes".to_string(), *hits as f64);
                values.insert("fails".to_string(), (total - hits) as f64);
            }
            SeriesValue::Trend(_) => {
                for stat in trend_stats {
                    if let Some(v) = stat.value_of(value) {
                        values.insert(stat.to_string(), v);
                    }
                }
            }
        }
        Self { kind, values }
    }
}

/// Statistic reported for trends in the run summary
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrendStat {
    Avg,
    Min,
    Med,
    Max,
    Count,
    Percentile(f64),
}

impl TrendStat {
    /// Statistics reported when none are configured
    pub fn defaults() -> Vec<TrendStat> {
        vec![
            TrendStat::Avg,
            TrendStat::Min,
            TrendStat::Med,
            TrendStat::Max,
            TrendStat::Percentile(90.0),
            TrendStat::Percentile(95.0),
            TrendStat::Percentile(99.0),
        ]
    }

    pub fn value_of(&self, value: &SeriesValue) -> Option<f64> {
        match self {
            TrendStat::Avg => value.avg(),
            TrendStat::Min => value.min(),
            TrendStat::Med => value.percentile(50.0),
            TrendStat::Max => value.max(),
            TrendStat::Count => value.count(),
            TrendStat::Percentile(p) => value.percentile(*p),
        }
    }
}

impl fmt::Display for TrendStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendStat::Avg => f.write_str("avg"),
            TrendStat::Min => f.write_str("min"),
            TrendStat::Med => f.write_str("med"),
            TrendStat::Max => f.write_str("max"),
            TrendStat::Count => f.write_str("count"),
            TrendStat::Percentile(p) => write!(f, "p({})", p),
        }
    }
}

impl FromStr for TrendStat {
    type Err = MetricsError;

    fn from_str(s: &str) -> MetricsResult<Self> {
        let s = s.trim();
        match s {
            "avg" => return Ok(TrendStat::Avg),
            "min" => return Ok(TrendStat::Min),
            "med" => return Ok(TrendStat::Med),
            "max" => return Ok(TrendStat::Max),
            "count" => return Ok(TrendStat::Count),
            _ => {}
        }
        s.strip_prefix("p(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|p| p.trim().parse::<f64>().ok())
            .filter(|p| (0.0..=100.0).contains(p))
            .map(TrendStat::Percentile)
            .ok_or_else(|| MetricsError::InvalidStat(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MetricsRegistry;

    fn sample_snapshot() -> MetricsSnapshot {
        let registry = MetricsRegistry::new();
        let list = TagSet::new().with("endpoint", "debts").with("operation", "list");
        let create = TagSet::new().with("endpoint", "debts").with("operation", "create");
        let health = TagSet::new().with("endpoint", "health");
        for v in [100.0, 200.0, 300.0] {
            registry.add_trend("http_req_duration", v, &list).unwrap();
        }
        registry.add_trend("http_req_duration", 900.0, &create).unwrap();
        registry.add_trend("http_req_duration", 5.0, &health).unwrap();
        registry.add_rate("http_req_failed", false, &list).unwrap();
        registry.add_rate("http_req_failed", true, &create).unwrap();
        registry.add_counter("http_reqs", 5.0, &TagSet::new()).unwrap();
        registry
            .snapshot_with_duration(Duration::from_secs(10))
            .unwrap()
    }

    #[test]
    fn test_aggregate_with_filter() {
        let snapshot = sample_snapshot();
        let debts = snapshot
            .aggregate("http_req_duration", &TagSet::new().with("endpoint", "debts"))
            .unwrap();
        assert_eq!(debts.count(), Some(4.0));
        assert_eq!(debts.max(), Some(900.0));

        let all = snapshot
            .aggregate("http_req_duration", &TagSet::new())
            .unwrap();
        assert_eq!(all.count(), Some(5.0));
        assert_eq!(all.min(), Some(5.0));
    }

    #[test]
    fn test_gauge_aggregate_keeps_latest_sample() {
        let registry = MetricsRegistry::new();
        let smoke = TagSet::new().with("scenario", "smoke");
        let load = TagSet::new().with("scenario", "load");
        let t0 = std::time::Instant::now();
        registry
            .set_gauge_at("active_workers", 50.0, &load, t0)
            .unwrap();
        registry
            .set_gauge_at("active_workers", 1.0, &smoke, t0 + Duration::from_millis(10))
            .unwrap();
        let snapshot = registry.snapshot_with_duration(Duration::from_secs(1)).unwrap();

        let all = snapshot.aggregate("active_workers", &TagSet::new()).unwrap();
        assert_eq!(all.value(), Some(1.0));
        assert_eq!(all.max(), Some(50.0));

        let load_only = snapshot.aggregate("active_workers", &load).unwrap();
        assert_eq!(load_only.value(), Some(50.0));
    }

    #[test]
    fn test_aggregate_no_match() {
        let snapshot = sample_snapshot();
        assert!(snapshot
            .aggregate("http_req_duration", &TagSet::new().with("endpoint", "payments"))
            .is_none());
        assert!(snapshot.aggregate("unknown", &TagSet::new()).is_none());
    }

    #[test]
    fn test_summarize() {
        let snapshot = sample_snapshot();
        let summary = snapshot.summarize(&[TrendStat::Count, TrendStat::Max]);

        let reqs = &summary["http_reqs"];
        assert_eq!(reqs.kind, MetricKind::Counter);
        assert_eq!(reqs.values["count"], 5.0);
        assert_eq!(reqs.values["rate"], 0.5);

        let failed = &summary["http_req_failed"];
        assert_eq!(failed.values["rate"], 0.5);
        assert_eq!(failed.values["passes"], 1.0);
        assert_eq!(failed.values["fails"], 1.0);

        let duration = &summary["http_req_duration"];
        assert_eq!(duration.values["count"], 5.0);
        assert_eq!(duration.values["max"], 900.0);
        assert!(!duration.values.contains_key("avg"));
    }

    #[test]
    fn test_trend_stat_parsing() {
        assert_eq!("avg".parse::<TrendStat>().unwrap(), TrendStat::Avg);
        assert_eq!(
            "p(99.9)".parse::<TrendStat>().unwrap(),
            TrendStat::Percentile(99.9)
        );
        assert_eq!(TrendStat::Percentile(95.0).to_string(), "p(95)");
        assert!("p(101)".parse::<TrendStat>().is_err());
        assert!("mean".parse::<TrendStat>().is_err());
    }
}
