//! End-of-run summary and exit contract

use chrono::{DateTime, Utc};
use serde::Serialize;
use stampede_metrics::MetricSummary;
use stampede_thresholds::ThresholdVerdict;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::error::{RunError, RunResult};
use crate::scheduler::ScenarioReport;

pub const EXIT_OK: i32 = 0;
pub const EXIT_THRESHOLDS_FAILED: i32 = 99;
pub const EXIT_INVALID_CONFIG: i32 = 104;
pub const EXIT_SETUP_FAILURE: i32 = 107;
pub const EXIT_SCHEDULER_FAULT: i32 = 108;

/// Kind of the fatal error reported when setup fails
pub const SETUP_FAILURE_KIND: &str = "setup_failure";

/// What ended the run early, if anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FatalError {
    pub kind: String,
    pub message: String,
}

impl FatalError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// The JSON document produced at the end of every run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    /// Label of the run, from the `SCENARIO` environment override
    pub scenario: String,
    pub duration_ms: u64,
    pub passed: bool,
    pub exit_code: i32,
    pub metrics: BTreeMap<String, MetricSummary>,
    pub thresholds: Vec<ThresholdVerdict>,
    pub scenarios: Vec<ScenarioReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<FatalError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_breach: Option<ThresholdVerdict>,
}

impl RunSummary {
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    /// Reported value `stat` of metric `name`
    pub fn metric_value(&self, name: &str, stat: &str) -> Option<f64> {
        self.metric(name)?.values.get(stat).copied()
    }

    pub fn to_json(&self) -> RunResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON document to `path`
    pub fn write_to(&self, path: impl AsRef<Path>) -> RunResult<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| RunError::Export {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Human-readable end-of-run report
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let verdict = if self.passed { "PASSED" } else { "FAILED" };
        let _ = writeln!(
            out,
            "\n  run: {}   duration: {:.1}s   result: {} (exit {})",
            self.scenario,
            self.duration_ms as f64 / 1000.0,
            verdict,
            self.exit_code
        );
        if let Some(fatal) = &self.fatal_error {
            let _ = writeln!(out, "  fatal: {}: {}", fatal.kind, fatal.message);
        }

        if !self.scenarios.is_empty() {
            let _ = writeln!(out, "\n  scenarios");
            for scenario in &self.scenarios {
                let _ = writeln!(
                    out,
                    "    {:<16} {:<20} {:<9} peak={} forced_stops={} iterations={}",
                    scenario.name,
                    scenario.executor.as_str(),
                    scenario.final_state.as_str(),
                    scenario.peak_workers,
                    scenario.forced_stops,
                    scenario.iterations_started
                );
            }
        }

        if !self.metrics.is_empty() {
            let _ = writeln!(out, "\n  metrics");
            let width = self.metrics.keys().map(String::len).max().unwrap_or(0) + 2;
            for (name, summary) in &self.metrics {
                let values: Vec<String> = summary
                    .values
                    .iter()
                    .map(|(stat, value)| format!("{}={}", stat, format_value(*value)))
                    .collect();
                let _ = writeln!(
                    out,
                    "    {:.<width$} {}",
                    format!("{} ", name),
                    values.join(" "),
                    width = width
                );
            }
        }

        if !self.thresholds.is_empty() {
            let _ = writeln!(out, "\n  thresholds");
            for verdict in &self.thresholds {
                let mark = if verdict.passed { "ok  " } else { "FAIL" };
                let observed = verdict
                    .observed
                    .map(format_value)
                    .unwrap_or_else(|| "no data".to_string());
                let _ = write!(
                    out,
                    "    {} {} {}  observed={}",
                    mark, verdict.selector, verdict.predicate, observed
                );
                if let Some(error) = &verdict.error {
                    let _ = write!(out, "  error={}", error);
                }
                let _ = writeln!(out);
            }
        }
        out
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// Exit code for a finished run
///
/// Fatal errors take precedence over threshold verdicts: a setup failure is
/// 107 even when thresholds would also have failed.
pub fn exit_code_for(fatal_exit: Option<i32>, thresholds_passed: bool) -> i32 {
    match fatal_exit {
        Some(code) => code,
        None if thresholds_passed => EXIT_OK,
        None => EXIT_THRESHOLDS_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::{ExecutorKind, ScenarioState};
    use stampede_metrics::MetricKind;

    fn summary() -> RunSummary {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "http_req_failed".to_string(),
            MetricSummary {
                kind: MetricKind::Rate,
                values: [
                    ("rate".to_string(), 0.012),
                    ("passes".to_string(), 5.0),
                    ("fails".to_string(), 995.0),
                ]
                .into(),
            },
        );
        RunSummary {
            timestamp: Utc::now(),
            scenario: "load".to_string(),
            duration_ms: 12_345,
            passed: true,
            exit_code: EXIT_OK,
            metrics,
            thresholds: vec![ThresholdVerdict {
                selector: "http_req_failed".to_string(),
                predicate: "rate<0.05".to_string(),
                observed: Some(0.012),
                passed: true,
                abort_on_breach: false,
                error: None,
            }],
            scenarios: vec![ScenarioReport {
                name: "load".to_string(),
                executor: ExecutorKind::RampingConcurrency,
                final_state: ScenarioState::Stopped,
                peak_workers: 50,
                forced_stops: 0,
                iterations_started: 1000,
            }],
            fatal_error: None,
            first_breach: None,
        }
    }

    #[test]
    fn test_exit_code_precedence() {
        assert_eq!(exit_code_for(None, true), 0);
        assert_eq!(exit_code_for(None, false), 99);
        assert_eq!(exit_code_for(Some(EXIT_SETUP_FAILURE), false), 107);
        assert_eq!(exit_code_for(Some(EXIT_SCHEDULER_FAULT), true), 108);
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&summary().to_json().unwrap()).unwrap();
        assert_eq!(json["scenario"], "load");
        assert_eq!(json["exit_code"], 0);
        assert_eq!(json["metrics"]["http_req_failed"]["type"], "rate");
        assert_eq!(json["metrics"]["http_req_failed"]["values"]["rate"], 0.012);
        assert_eq!(json["thresholds"][0]["predicate"], "rate<0.05");
        assert_eq!(json["scenarios"][0]["state"], "stopped");
        assert_eq!(json["scenarios"][0]["executor"], "ramping-concurrency");
        assert!(json.get("fatal_error").is_none());
        assert!(json.get("first_breach").is_none());
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        summary().write_to(&path).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["duration_ms"], 12_345);

        let missing = dir.path().join("no-such-dir").join("summary.json");
        assert!(matches!(
            summary().write_to(&missing),
            Err(RunError::Export { .. })
        ));
    }

    #[test]
    fn test_render_text() {
        let mut failed = summary();
        failed.passed = false;
        failed.exit_code = EXIT_SETUP_FAILURE;
        failed.fatal_error = Some(FatalError::new(
            SETUP_FAILURE_KIND,
            "health check returned 503",
        ));

        let text = failed.render_text();
        assert!(text.contains("result: FAILED (exit 107)"));
        assert!(text.contains("fatal: setup_failure: health check returned 503"));
        assert!(text.contains("rate=0.01"));
        assert!(text.contains("fails=995"));
        assert!(text.contains("ok   http_req_failed rate<0.05  observed=0.01"));
        assert_eq!(failed.metric_value("http_req_failed", "passes"), Some(5.0));
    }
}
