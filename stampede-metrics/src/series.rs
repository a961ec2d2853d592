//! Live metric series and their point-in-time values

use crate::digest::TrendDigest;
use crate::errors::{MetricsError, MetricsResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Number of independently locked digests behind one trend series
const TREND_SHARDS: usize = 8;

/// The four metric kinds; fixed per metric name for the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Rate => "rate",
            MetricKind::Trend => "trend",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic sum stored as `f64` bits
#[derive(Debug, Default)]
pub(crate) struct CounterSeries {
    bits: AtomicU64,
}

impl CounterSeries {
    pub(crate) fn add(&self, delta: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub(crate) fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

#[derive(Debug, Clone, Copy)]
struct GaugeState {
    value: f64,
    at: Instant,
    min: f64,
    max: f64,
}

/// Last value by sample timestamp, with the observed range
#[derive(Debug, Default)]
pub(crate) struct GaugeSeries {
    state: Mutex<Option<GaugeState>>,
}

impl GaugeSeries {
    pub(crate) fn set(&self, value: f64, at: Instant) {
        let mut state = self.state.lock();
        match state.as_mut() {
            None => {
                *state = Some(GaugeState {
                    value,
                    at,
                    min: value,
                    max: value,
                })
            }
            Some(current) => {
                if at >= current.at {
                    current.value = value;
                    current.at = at;
                }
                current.min = current.min.min(value);
                current.max = current.max.max(value);
            }
        }
    }

    fn value(&self) -> Option<GaugeState> {
        *self.state.lock()
    }
}

/// Hits over total observations
#[derive(Debug, Default)]
pub(crate) struct RateSeries {
    hits: AtomicU64,
    total: AtomicU64,
}

impl RateSeries {
    pub(crate) fn add(&self, hit: bool) {
        // total first so a concurrent reader never sees hits > total
        self.total.fetch_add(1, Ordering::SeqCst);
        if hit {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn value(&self) -> (u64, u64) {
        let hits = self.hits.load(Ordering::SeqCst);
        let total = self.total.load(Ordering::SeqCst);
        (hits, total.max(hits))
    }
}

/// Distribution of observed values, sharded to spread lock contention
pub(crate) struct TrendSeries {
    shards: Vec<Mutex<TrendDigest>>,
    next: AtomicUsize,
}

impl TrendSeries {
    pub(crate) fn new() -> MetricsResult<Self> {
        let shards = (0..TREND_SHARDS)
            .map(|_| TrendDigest::new().map(Mutex::new))
            .collect::<MetricsResult<Vec<_>>>()?;
        Ok(Self {
            shards,
            next: AtomicUsize::new(0),
        })
    }

    pub(crate) fn record(&self, value: f64) -> MetricsResult<()> {
        let shard = self.next.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        self.shards[shard].lock().record(value)
    }

    fn value(&self) -> MetricsResult<TrendDigest> {
        let mut merged = TrendDigest::new()?;
        for shard in &self.shards {
            merged.merge(&shard.lock())?;
        }
        Ok(merged)
    }
}

impl fmt::Debug for TrendSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrendSeries")
            .field("shards", &self.shards.len())
            .finish()
    }
}

/// A live series of one of the four kinds
#[derive(Debug)]
pub(crate) enum Series {
    Counter(CounterSeries),
    Gauge(GaugeSeries),
    Rate(RateSeries),
    Trend(TrendSeries),
}

impl Series {
    pub(crate) fn new(kind: MetricKind) -> MetricsResult<Self> {
        Ok(match kind {
            MetricKind::Counter => Series::Counter(CounterSeries::default()),
            MetricKind::Gauge => Series::Gauge(GaugeSeries::default()),
            MetricKind::Rate => Series::Rate(RateSeries::default()),
            MetricKind::Trend => Series::Trend(TrendSeries::new()?),
        })
    }

    /// Point-in-time value; `None` for a gauge that was never set
    pub(crate) fn value(&self) -> MetricsResult<Option<SeriesValue>> {
        Ok(match self {
            Series::Counter(c) => Some(SeriesValue::Counter { sum: c.value() }),
            Series::Gauge(g) => g.value().map(|s| SeriesValue::Gauge {
                value: s.value,
                min: s.min,
                max: s.max,
                at: s.at,
            }),
            Series::Rate(r) => {
                let (hits, total) = r.value();
                Some(SeriesValue::Rate { hits, total })
            }
            Series::Trend(t) => Some(SeriesValue::Trend(t.value()?)),
        })
    }
}

/// Aggregated value of one series (or of several merged series)
#[derive(Debug, Clone)]
pub enum SeriesValue {
    Counter {
        sum: f64,
    },
    Gauge {
        value: f64,
        min: f64,
        max: f64,
        at: Instant,
    },
    Rate {
        hits: u64,
        total: u64,
    },
    Trend(TrendDigest),
}

impl SeriesValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            SeriesValue::Counter { .. } => MetricKind::Counter,
            SeriesValue::Gauge { .. } => MetricKind::Gauge,
            SeriesValue::Rate { .. } => MetricKind::Rate,
            SeriesValue::Trend(_) => MetricKind::Trend,
        }
    }

    /// Fold another value of the same kind into this one
    pub fn merge(&mut self, other: &SeriesValue) -> MetricsResult<()> {
        match (self, other) {
            (SeriesValue::Counter { sum }, SeriesValue::Counter { sum: o }) => *sum += o,
            (
                SeriesValue::Gauge {
                    value,
                    min,
                    max,
                    at,
                },
                SeriesValue::Gauge {
                    value: ov,
                    min: omin,
                    max: omax,
                    at: oat,
                },
            ) => {
                if *oat >= *at {
                    *value = *ov;
                    *at = *oat;
                }
                *min = min.min(*omin);
                *max = max.max(*omax);
            }
            (SeriesValue::Rate { hits, total }, SeriesValue::Rate { hits: oh, total: ot }) => {
                *hits += oh;
                *total += ot;
            }
            (SeriesValue::Trend(digest), SeriesValue::Trend(o)) => digest.merge(o)?,
            (this, other) => {
                return Err(MetricsError::KindMismatch {
                    name: String::new(),
                    existing: this.kind(),
                    requested: other.kind(),
                })
            }
        }
        Ok(())
    }

    /// Number of observations: counter sum, rate total, trend sample count
    pub fn count(&self) -> Option<f64> {
        match self {
            SeriesValue::Counter { sum } => Some(*sum),
            SeriesValue::Rate { total, .. } => Some(*total as f64),
            SeriesValue::Trend(d) => Some(d.count() as f64),
            SeriesValue::Gauge { .. } => None,
        }
    }

    /// Hit ratio for rates, per-second throughput for counters
    pub fn rate(&self, elapsed: Duration) -> Option<f64> {
        match self {
            SeriesValue::Rate { hits, total } => Some(if *total == 0 {
                0.0
            } else {
                *hits as f64 / *total as f64
            }),
            SeriesValue::Counter { sum } => {
                let secs = elapsed.as_secs_f64();
                Some(if secs > 0.0 { sum / secs } else { 0.0 })
            }
            _ => None,
        }
    }

    /// Current value: counter sum, last gauge value, rate ratio
    pub fn value(&self) -> Option<f64> {
        match self {
            SeriesValue::Counter { sum } => Some(*sum),
            SeriesValue::Gauge { value, .. } => Some(*value),
            SeriesValue::Rate { .. } => self.rate(Duration::ZERO),
            SeriesValue::Trend(_) => None,
        }
    }

    pub fn avg(&self) -> Option<f64> {
        match self {
            SeriesValue::Trend(d) => d.avg(),
            _ => None,
        }
    }

    pub fn min(&self) -> Option<f64> {
        match self {
            SeriesValue::Trend(d) => d.min(),
            SeriesValue::Gauge { min, .. } => Some(*min),
            _ => None,
        }
    }

    pub fn max(&self) -> Option<f64> {
        match self {
            SeriesValue::Trend(d) => d.max(),
            SeriesValue::Gauge { max, .. } => Some(*max),
            _ => None,
        }
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        match self {
            SeriesValue::Trend(d) => d.percentile(p),
            _ => None,
        }
    }
}
