//! Run-wide immutable context and environment overrides

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Environment variable that labels the active scenario in summaries
pub const SCENARIO_ENV: &str = "SCENARIO";

/// Variables read from the process environment even when the
/// configuration declares no default for them
pub const PROCESS_VARS: [&str; 3] = ["BASE_URL", "API_VERSION", SCENARIO_ENV];

/// Named variables resolved once at run start, read-only afterwards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    vars: Arc<BTreeMap<String, String>>,
}

impl EnvOverrides {
    pub fn new(vars: BTreeMap<String, String>) -> Self {
        Self {
            vars: Arc::new(vars),
        }
    }

    /// Resolve configured defaults against the process environment and
    /// explicit overrides.
    ///
    /// Precedence, lowest to highest: `defaults`, a process environment
    /// variable with the same name, `explicit`. Names in [`PROCESS_VARS`]
    /// are looked up whether or not `defaults` mentions them.
    pub fn resolve(
        defaults: &BTreeMap<String, String>,
        explicit: &BTreeMap<String, String>,
    ) -> Self {
        Self::resolve_with(defaults, explicit, |name| std::env::var(name).ok())
    }

    /// Same as [`EnvOverrides::resolve`] with an injectable lookup
    pub fn resolve_with<F>(
        defaults: &BTreeMap<String, String>,
        explicit: &BTreeMap<String, String>,
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = BTreeMap::new();
        for (name, default) in defaults {
            let value = lookup(name).unwrap_or_else(|| default.clone());
            vars.insert(name.clone(), value);
        }
        for name in PROCESS_VARS {
            if vars.contains_key(name) {
                continue;
            }
            if let Some(value) = lookup(name) {
                vars.insert(name.to_string(), value);
            }
        }
        for (name, value) in explicit {
            vars.insert(name.clone(), value.clone());
        }
        Self::new(vars)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// A copy with `overrides` layered on top
    pub fn layered(&self, overrides: &BTreeMap<String, String>) -> EnvOverrides {
        if overrides.is_empty() {
            return self.clone();
        }
        let mut vars = (*self.vars).clone();
        vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::new(vars)
    }

    /// Label of the active scenario, `default` when unset
    pub fn active_scenario(&self) -> &str {
        self.get_or(SCENARIO_ENV, "default")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Value produced once by setup and shared read-only with every iteration
///
/// There are no mutating accessors; once wrapped in an `Arc` and handed to
/// the scheduler it stays unchanged for the rest of the run.
#[derive(Debug, Clone)]
pub struct TestRunContext {
    data: JsonValue,
    env: EnvOverrides,
    started_at: DateTime<Utc>,
}

impl TestRunContext {
    pub fn new(data: JsonValue, env: EnvOverrides) -> Self {
        Self {
            data,
            env,
            started_at: Utc::now(),
        }
    }

    /// Context used when setup never produced data
    pub fn empty(env: EnvOverrides) -> Self {
        Self::new(JsonValue::Null, env)
    }

    /// Data returned by the setup hook
    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    /// Look up a top-level field of the setup data
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.data.get(key)
    }

    /// Look up a top-level string field of the setup data
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(JsonValue::as_str)
    }

    pub fn env(&self) -> &EnvOverrides {
        &self.env
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
