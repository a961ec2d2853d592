//! Run-wide engine options

use crate::error::{ConfigError, ConfigResult};
use crate::validation::{validate_duration, Validatable};
use serde::{Deserialize, Serialize};
use stampede_metrics::TrendStat;
use std::path::PathBuf;
use std::time::Duration;

/// Engine options shared by every scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OptionsConfig {
    /// Scheduler reconciliation period
    #[serde(with = "humantime_serde")]
    pub tick: Duration,

    #[serde(with = "humantime_serde")]
    pub setup_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub teardown_timeout: Duration,

    /// Seed for per-worker random generators; random when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Trend statistics reported in the summary
    pub summary_trend_stats: Vec<String>,

    /// Period of abort-on-breach threshold checks
    #[serde(with = "humantime_serde")]
    pub threshold_check_interval: Duration,

    /// Write the JSON summary to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_export: Option<PathBuf>,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            setup_timeout: Duration::from_secs(60),
            teardown_timeout: Duration::from_secs(60),
            seed: None,
            summary_trend_stats: TrendStat::defaults()
                .iter()
                .map(ToString::to_string)
                .collect(),
            threshold_check_interval: Duration::from_secs(1),
            summary_export: None,
        }
    }
}

impl OptionsConfig {
    pub fn trend_stats(&self) -> ConfigResult<Vec<TrendStat>> {
        self.summary_trend_stats
            .iter()
            .map(|s| {
                s.parse::<TrendStat>().map_err(|e| ConfigError::DomainError {
                    domain: self.domain_name().to_string(),
                    message: format!("summaryTrendStats: {}", e),
                })
            })
            .collect()
    }
}

impl Validatable for OptionsConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_duration(self.tick, "tick", self.domain_name())?;
        validate_duration(self.setup_timeout, "setupTimeout", self.domain_name())?;
        validate_duration(self.teardown_timeout, "teardownTimeout", self.domain_name())?;
        validate_duration(
            self.threshold_check_interval,
            "thresholdCheckInterval",
            self.domain_name(),
        )?;
        if self.tick > Duration::from_secs(10) {
            log::warn!(
                "Scheduler tick of {:?} will make ramps visibly coarse",
                self.tick
            );
        }
        self.trend_stats().map(|_| ())
    }

    fn domain_name(&self) -> &'static str {
        "options"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = OptionsConfig::default();
        assert_eq!(options.tick, Duration::from_millis(100));
        assert!(options.validate().is_ok());
        assert_eq!(
            options.summary_trend_stats,
            vec!["avg", "min", "med", "max", "p(90)", "p(95)", "p(99)"]
        );
    }

    #[test]
    fn test_partial_yaml() {
        let options: OptionsConfig =
            serde_yaml::from_str("tick: 50ms\nseed: 7\nsummaryTrendStats: [avg, \"p(99.9)\"]")
                .unwrap();
        assert_eq!(options.tick, Duration::from_millis(50));
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.setup_timeout, Duration::from_secs(60));
        assert_eq!(
            options.trend_stats().unwrap(),
            vec![TrendStat::Avg, TrendStat::Percentile(99.9)]
        );
    }

    #[test]
    fn test_invalid() {
        let options = OptionsConfig {
            tick: Duration::ZERO,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = OptionsConfig {
            summary_trend_stats: vec!["mean".to_string()],
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
