//! Scenario model: executors, stages and concurrency interpolation

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use crate::error::ScenarioError;
use crate::tags::TagSet;

const MAX_SCENARIO_NAME_LEN: usize = 64;

/// One ramp segment: reach `target` workers over `duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Desired concurrency at `elapsed` for a stage sequence starting from `initial`
///
/// Linear between the previous target and the current stage target, truncated
/// toward zero. Past the last boundary the final target is returned; an empty
/// sequence holds `initial`.
pub fn interpolate_stages(initial: u32, stages: &[Stage], elapsed: Duration) -> u32 {
    let mut stage_start = Duration::ZERO;
    let mut from = initial;

    for stage in stages {
        let stage_end = stage_start + stage.duration;
        if elapsed < stage_end {
            let progress =
                (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
            let from_f = f64::from(from);
            let value = from_f + (f64::from(stage.target) - from_f) * progress;
            return value.max(0.0) as u32;
        }
        stage_start = stage_end;
        from = stage.target;
    }

    from
}

/// Executor kind as it appears in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    #[serde(alias = "constant-vus")]
    ConstantConcurrency,
    #[serde(alias = "ramping-vus")]
    RampingConcurrency,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorKind::ConstantConcurrency => "constant-concurrency",
            ExecutorKind::RampingConcurrency => "ramping-concurrency",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a scenario's concurrency evolves over its local time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executor {
    /// A fixed number of workers for a fixed duration
    ConstantConcurrency { workers: u32, duration: Duration },
    /// Start at `initial_workers` and follow the stage sequence
    RampingConcurrency {
        initial_workers: u32,
        stages: Vec<Stage>,
    },
}

impl Executor {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            Executor::ConstantConcurrency { .. } => ExecutorKind::ConstantConcurrency,
            Executor::RampingConcurrency { .. } => ExecutorKind::RampingConcurrency,
        }
    }

    /// Desired live workers at `elapsed` since the scenario started
    pub fn desired_workers(&self, elapsed: Duration) -> u32 {
        match self {
            Executor::ConstantConcurrency { workers, duration } => {
                if elapsed < *duration {
                    *workers
                } else {
                    0
                }
            }
            Executor::RampingConcurrency {
                initial_workers,
                stages,
            } => interpolate_stages(*initial_workers, stages, elapsed),
        }
    }

    /// Time from scenario start until its final stage completes
    pub fn total_duration(&self) -> Duration {
        match self {
            Executor::ConstantConcurrency { duration, .. } => *duration,
            Executor::RampingConcurrency { stages, .. } => {
                stages.iter().map(|stage| stage.duration).sum()
            }
        }
    }

    /// Highest concurrency the executor ever asks for
    pub fn peak_workers(&self) -> u32 {
        match self {
            Executor::ConstantConcurrency { workers, .. } => *workers,
            Executor::RampingConcurrency {
                initial_workers,
                stages,
            } => stages
                .iter()
                .map(|stage| stage.target)
                .fold(*initial_workers, u32::max),
        }
    }

    /// Active phase at `elapsed`: ramping while the target moves, steady otherwise
    pub fn phase_at(&self, elapsed: Duration) -> ScenarioState {
        match self {
            Executor::ConstantConcurrency { .. } => ScenarioState::Steady,
            Executor::RampingConcurrency {
                initial_workers,
                stages,
            } => {
                let mut stage_start = Duration::ZERO;
                let mut from = *initial_workers;
                for stage in stages {
                    let stage_end = stage_start + stage.duration;
                    if elapsed < stage_end {
                        return if stage.target == from {
                            ScenarioState::Steady
                        } else {
                            ScenarioState::Ramping
                        };
                    }
                    stage_start = stage_end;
                    from = stage.target;
                }
                ScenarioState::Steady
            }
        }
    }
}

/// Scenario lifecycle: Pending → Ramping/Steady → Draining → Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioState {
    Pending,
    Ramping,
    Steady,
    Draining,
    Stopped,
}

impl ScenarioState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioState::Pending => "pending",
            ScenarioState::Ramping => "ramping",
            ScenarioState::Steady => "steady",
            ScenarioState::Draining => "draining",
            ScenarioState::Stopped => "stopped",
        }
    }

    /// Workers may be spawned or retired in this state
    pub fn is_active(&self) -> bool {
        matches!(self, ScenarioState::Ramping | ScenarioState::Steady)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScenarioState::Stopped)
    }
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded random pause between iterations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkTime {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl ThinkTime {
    pub const NONE: ThinkTime = ThinkTime {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn between(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::between(delay, delay)
    }

    pub fn is_none(&self) -> bool {
        self.max.is_zero()
    }

    /// Draw a delay uniformly from `[min, max]`
    ///
    /// Bounds beyond `u64::MAX` nanoseconds (about 584 years) saturate.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let nanos = |d: Duration| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        let (low, high) = (nanos(self.min), nanos(self.max));
        Duration::from_nanos(rng.random_range(low..=high))
    }
}

/// Validated description of one named traffic pattern
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSpec {
    pub name: String,
    pub executor: Executor,
    /// Grace period after the final stage before workers are force-stopped
    pub graceful_stop: Duration,
    /// Delay after run start before the scenario begins
    pub start_offset: Duration,
    /// Static tags attached to every sample from this scenario
    pub tags: TagSet,
    /// Environment overrides visible only to this scenario's iterations
    pub env_overrides: BTreeMap<String, String>,
    pub think_time: ThinkTime,
    /// Upper bound on a single iteration, if any
    pub iteration_timeout: Option<Duration>,
}

impl ScenarioSpec {
    pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

    pub fn new(name: impl Into<String>, executor: Executor) -> Self {
        Self {
            name: name.into(),
            executor,
            graceful_stop: Self::DEFAULT_GRACEFUL_STOP,
            start_offset: Duration::ZERO,
            tags: TagSet::new(),
            env_overrides: BTreeMap::new(),
            think_time: ThinkTime::NONE,
            iteration_timeout: None,
        }
    }

    pub fn constant(name: impl Into<String>, workers: u32, duration: Duration) -> Self {
        Self::new(name, Executor::ConstantConcurrency { workers, duration })
    }

    pub fn ramping(name: impl Into<String>, initial_workers: u32, stages: Vec<Stage>) -> Self {
        Self::new(
            name,
            Executor::RampingConcurrency {
                initial_workers,
                stages,
            },
        )
    }

    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    pub fn with_start_offset(mut self, start_offset: Duration) -> Self {
        self.start_offset = start_offset;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_think_time(mut self, think_time: ThinkTime) -> Self {
        self.think_time = think_time;
        self
    }

    pub fn with_iteration_timeout(mut self, timeout: Duration) -> Self {
        self.iteration_timeout = Some(timeout);
        self
    }

    /// Offset from run start at which the final stage completes
    pub fn end_offset(&self) -> Duration {
        self.start_offset + self.executor.total_duration()
    }

    /// Latest offset from run start at which any worker may still be live
    pub fn hard_deadline(&self) -> Duration {
        self.end_offset() + self.graceful_stop
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        validate_name(&self.name)?;

        match &self.executor {
            Executor::ConstantConcurrency { duration, .. } => {
                if duration.is_zero() {
                    return Err(ScenarioError::ZeroDuration {
                        scenario: self.name.clone(),
                        field: "duration".to_string(),
                    });
                }
            }
            Executor::RampingConcurrency { stages, .. } => {
                if stages.is_empty() {
                    return Err(ScenarioError::NoStages(self.name.clone()));
                }
                if let Some(index) = stages.iter().position(|s| s.duration.is_zero()) {
                    return Err(ScenarioError::ZeroDuration {
                        scenario: self.name.clone(),
                        field: format!("stages[{}].duration", index),
                    });
                }
            }
        }

        if self.think_time.min > self.think_time.max {
            return Err(ScenarioError::InvalidThinkTime(self.name.clone()));
        }

        if self.iteration_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ScenarioError::ZeroDuration {
                scenario: self.name.clone(),
                field: "iteration_timeout".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), ScenarioError> {
    if name.is_empty() {
        return Err(ScenarioError::EmptyName);
    }
    if name.len() > MAX_SCENARIO_NAME_LEN {
        return Err(ScenarioError::InvalidName {
            name: name.to_string(),
            reason: format!("longer than {} characters", MAX_SCENARIO_NAME_LEN),
        });
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.'))
    {
        return Err(ScenarioError::InvalidName {
            name: name.to_string(),
            reason: format!("contains invalid character '{}'", c),
        });
    }
    Ok(())
}

/// Validate a full scenario set before any traffic is generated
pub fn validate_scenarios(scenarios: &[ScenarioSpec]) -> Result<(), ScenarioError> {
    if scenarios.is_empty() {
        return Err(ScenarioError::NoScenarios);
    }

    let mut seen = HashSet::new();
    for scenario in scenarios {
        scenario.validate()?;
        if !seen.insert(scenario.name.as_str()) {
            return Err(ScenarioError::Duplicate(scenario.name.clone()));
        }
    }
    Ok(())
}
