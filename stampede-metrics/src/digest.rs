//! Mergeable quantile digest backing trend metrics

use crate::errors::{MetricsError, MetricsResult};
use hdrhistogram::Histogram;
use std::fmt;

/// Values are stored in thousandths so sub-unit samples keep resolution
const SCALE: f64 = 1000.0;

/// Largest recordable value; scaled values stay exact integers in an `f64`
pub const MAX_VALUE: f64 = 9.0e15 / SCALE;

/// Significant decimal digits kept by the histogram (relative error < 0.1%)
const SIGNIFICANT_DIGITS: u8 = 3;

/// Approximate distribution of non-negative values
///
/// Count, sum, min and max are exact. Quantiles come from an auto-resizing
/// HDR histogram and are clamped to the exact `[min, max]` range, so the
/// largest quantiles of a small sample report the true maximum.
#[derive(Clone)]
pub struct TrendDigest {
    histogram: Histogram<u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl TrendDigest {
    pub fn new() -> MetricsResult<Self> {
        let histogram = Histogram::<u64>::new(SIGNIFICANT_DIGITS)
            .map_err(|e| MetricsError::Histogram(e.to_string()))?;
        Ok(Self {
            histogram,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        })
    }

    pub fn record(&mut self, value: f64) -> MetricsResult<()> {
        if !value.is_finite() || !(0.0..=MAX_VALUE).contains(&value) {
            return Err(MetricsError::InvalidTrendValue(value));
        }
        // in range, so the cast is exact
        let scaled = (value * SCALE).round() as u64;
        self.histogram
            .record(scaled)
            .map_err(|e| MetricsError::Histogram(format!("{:?}", e)))?;
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        Ok(())
    }

    /// Fold `other` into this digest
    pub fn merge(&mut self, other: &TrendDigest) -> MetricsResult<()> {
        if other.count == 0 {
            return Ok(());
        }
        self.histogram
            .add(&other.histogram)
            .map_err(|e| MetricsError::Histogram(format!("{:?}", e)))?;
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn avg(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Value at percentile `p` in `[0, 100]`
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let quantile = (p / 100.0).clamp(0.0, 1.0);
        let raw = self.histogram.value_at_quantile(quantile) as f64 / SCALE;
        Some(raw.clamp(self.min, self.max))
    }

    pub fn median(&self) -> Option<f64> {
        self.percentile(50.0)
    }
}

impl fmt::Debug for TrendDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrendDigest")
            .field("count", &self.count)
            .field("sum", &self.sum)
            .field("min", &self.min())
            .field("max", &self.max())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn digest_of(values: &[f64]) -> TrendDigest {
        let mut digest = TrendDigest::new().unwrap();
        for v in values {
            digest.record(*v).unwrap();
        }
        digest
    }

    #[test]
    fn test_empty_digest() {
        let digest = TrendDigest::new().unwrap();
        assert!(digest.is_empty());
        assert_eq!(digest.percentile(95.0), None);
        assert_eq!(digest.avg(), None);
        assert_eq!(digest.min(), None);
    }

    #[test]
    fn test_exact_aggregates() {
        let digest = digest_of(&[10.0, 20.0, 30.0, 40.0]);
        assert_eq!(digest.count(), 4);
        assert_eq!(digest.sum(), 100.0);
        assert_eq!(digest.avg(), Some(25.0));
        assert_eq!(digest.min(), Some(10.0));
        assert_eq!(digest.max(), Some(40.0));
    }

    #[test]
    fn test_tail_percentile_reports_true_max() {
        let mut values = vec![100.0; 940];
        values.extend(std::iter::repeat_n(600.0, 60));
        let digest = digest_of(&values);
        assert_eq!(digest.percentile(95.0), Some(600.0));
        let p50 = digest.percentile(50.0).unwrap();
        assert!((p50 - 100.0).abs() < 0.1, "p50 = {}", p50);
    }

    #[test]
    fn test_percentile_relative_error() {
        let values: Vec<f64> = (1..=10_000).map(|v| v as f64).collect();
        let digest = digest_of(&values);
        let p90 = digest.percentile(90.0).unwrap();
        assert!((p90 - 9000.0).abs() / 9000.0 < 0.002, "p90 = {}", p90);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut digest = TrendDigest::new().unwrap();
        assert!(matches!(
            digest.record(-1.0),
            Err(MetricsError::InvalidTrendValue(_))
        ));
        assert!(digest.record(f64::NAN).is_err());
        assert!(matches!(
            digest.record(1e300),
            Err(MetricsError::InvalidTrendValue(_))
        ));
        assert!(digest.record(MAX_VALUE * 2.0).is_err());
        assert!(digest.is_empty());
    }

    #[test]
    fn test_largest_value_is_exact() {
        let mut digest = TrendDigest::new().unwrap();
        digest.record(MAX_VALUE).unwrap();
        assert_eq!(digest.count(), 1);
        assert_eq!(digest.max(), Some(MAX_VALUE));
    }

    #[test]
    fn test_merge_empty_is_identity() {
        let mut digest = digest_of(&[5.0, 7.0]);
        digest.merge(&TrendDigest::new().unwrap()).unwrap();
        assert_eq!(digest.count(), 2);
        assert_eq!(digest.min(), Some(5.0));
    }

    proptest! {
        #[test]
        fn merge_is_order_independent(
            a in prop::collection::vec(0u32..100_000, 0..200),
            b in prop::collection::vec(0u32..100_000, 0..200),
            c in prop::collection::vec(0u32..100_000, 0..200),
        ) {
            let to_f = |v: &Vec<u32>| v.iter().map(|x| *x as f64).collect::<Vec<_>>();
            let (da, db, dc) = (digest_of(&to_f(&a)), digest_of(&to_f(&b)), digest_of(&to_f(&c)));

            // (a + b) + c
            let mut left = da.clone();
            left.merge(&db).unwrap();
            left.merge(&dc).unwrap();

            // c + (b + a)
            let mut inner = db.clone();
            inner.merge(&da).unwrap();
            let mut right = dc.clone();
            right.merge(&inner).unwrap();

            prop_assert_eq!(left.count(), right.count());
            prop_assert_eq!(left.min(), right.min());
            prop_assert_eq!(left.max(), right.max());
            for p in [50.0, 90.0, 95.0, 99.0] {
                prop_assert_eq!(left.percentile(p), right.percentile(p));
            }
        }
    }
}
