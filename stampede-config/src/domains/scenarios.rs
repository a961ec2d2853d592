//! Scenario configuration

use crate::error::{ConfigError, ConfigResult};
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use stampede_core::{
    validate_scenarios, Executor, ExecutorKind, ScenarioSpec, Stage, TagSet, ThinkTime,
};
use std::collections::BTreeMap;
use std::time::Duration;

/// One named scenario as written in the configuration file
///
/// Accepts both the native keys and the common load-testing aliases
/// (`vus`, `startVUs`, `startTime`, `env`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    pub executor: ExecutorKind,

    /// Workers held for the whole duration (constant-concurrency)
    #[serde(default, alias = "vus", skip_serializing_if = "Option::is_none")]
    pub worker_count: Option<u32>,

    /// Length of a constant-concurrency scenario
    #[serde(
        default,
        with = "humantime_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,

    /// Workers at local time zero (ramping-concurrency)
    #[serde(default, alias = "startVUs", skip_serializing_if = "Option::is_none")]
    pub initial_workers: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,

    #[serde(
        default = "crate::domains::utils::default_graceful_stop",
        with = "humantime_serde"
    )]
    pub graceful_stop: Duration,

    #[serde(default, alias = "startTime", with = "humantime_serde")]
    pub start_offset: Duration,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    #[serde(default, alias = "env", skip_serializing_if = "BTreeMap::is_empty")]
    pub env_overrides: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think_time: Option<ThinkTime>,

    #[serde(
        default,
        with = "humantime_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub iteration_timeout: Option<Duration>,
}

impl ScenarioConfig {
    pub fn constant(workers: u32, duration: Duration) -> Self {
        Self {
            executor: ExecutorKind::ConstantConcurrency,
            worker_count: Some(workers),
            duration: Some(duration),
            initial_workers: None,
            stages: Vec::new(),
            graceful_stop: crate::domains::utils::default_graceful_stop(),
            start_offset: Duration::ZERO,
            tags: BTreeMap::new(),
            env_overrides: BTreeMap::new(),
            think_time: None,
            iteration_timeout: None,
        }
    }

    pub fn ramping(initial_workers: u32, stages: Vec<Stage>) -> Self {
        Self {
            executor: ExecutorKind::RampingConcurrency,
            worker_count: None,
            duration: None,
            initial_workers: Some(initial_workers),
            stages,
            ..Self::constant(0, Duration::ZERO)
        }
    }

    /// Convert into the validated scenario model
    pub fn to_spec(&self, name: &str) -> ConfigResult<ScenarioSpec> {
        let executor = match self.executor {
            ExecutorKind::ConstantConcurrency => {
                let workers = self.worker_count.ok_or_else(|| missing(name, "workerCount"))?;
                let duration = self.duration.ok_or_else(|| missing(name, "duration"))?;
                if !self.stages.is_empty() {
                    log::warn!("Scenario '{}': stages are ignored by constant-concurrency", name);
                }
                Executor::ConstantConcurrency { workers, duration }
            }
            ExecutorKind::RampingConcurrency => {
                if self.worker_count.is_some() || self.duration.is_some() {
                    log::warn!(
                        "Scenario '{}': workerCount/duration are ignored by ramping-concurrency",
                        name
                    );
                }
                Executor::RampingConcurrency {
                    initial_workers: self.initial_workers.unwrap_or(0),
                    stages: self.stages.clone(),
                }
            }
        };

        let spec = ScenarioSpec {
            name: name.to_string(),
            executor,
            graceful_stop: self.graceful_stop,
            start_offset: self.start_offset,
            tags: TagSet::from(self.tags.clone()),
            env_overrides: self.env_overrides.clone(),
            think_time: self.think_time.unwrap_or_default(),
            iteration_timeout: self.iteration_timeout,
        };
        spec.validate()?;
        Ok(spec)
    }
}

fn missing(scenario: &str, field: &str) -> ConfigError {
    ConfigError::DomainError {
        domain: "scenarios".to_string(),
        message: format!("scenario '{}' requires {}", scenario, field),
    }
}

/// Every configured scenario, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenariosConfig(pub BTreeMap<String, ScenarioConfig>);

impl ScenariosConfig {
    pub fn insert(&mut self, name: impl Into<String>, scenario: ScenarioConfig) {
        self.0.insert(name.into(), scenario);
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioConfig> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validated scenario set
    ///
    /// With `only`, just that scenario is returned and it starts immediately.
    pub fn to_specs(&self, only: Option<&str>) -> ConfigResult<Vec<ScenarioSpec>> {
        let specs = match only {
            Some(name) => {
                let scenario = self.0.get(name).ok_or_else(|| {
                    ConfigError::ValidationError(format!(
                        "scenario '{}' is not defined (available: {})",
                        name,
                        self.names().collect::<Vec<_>>().join(", ")
                    ))
                })?;
                vec![scenario.to_spec(name)?.with_start_offset(Duration::ZERO)]
            }
            None => self
                .0
                .iter()
                .map(|(name, scenario)| scenario.to_spec(name))
                .collect::<ConfigResult<Vec<_>>>()?,
        };
        validate_scenarios(&specs)?;
        Ok(specs)
    }
}

impl Validatable for ScenariosConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.0.is_empty() {
            return Err(self.validation_error("At least one scenario must be configured"));
        }
        self.to_specs(None).map(|_| ())
    }

    fn domain_name(&self) -> &'static str {
        "scenarios"
    }
}
