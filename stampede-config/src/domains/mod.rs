//! Domain-specific configuration modules

pub mod http;
pub mod logging;
pub mod options;
pub mod scenarios;
pub mod thresholds;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stampede_core::{ScenarioSpec, Stage, ThinkTime};
use stampede_metrics::TrendStat;
use stampede_thresholds::ThresholdSet;
use std::collections::BTreeMap;
use std::time::Duration;

use self::http::{EndpointConfig, HttpConfig, LoginConfig};
use self::scenarios::{ScenarioConfig, ScenariosConfig};
use self::thresholds::{ThresholdEntry, ThresholdsConfig};

/// Main Stampede configuration combining all domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StampedeConfig {
    /// Named traffic patterns
    pub scenarios: ScenariosConfig,

    /// Pass/fail criteria
    #[serde(skip_serializing_if = "ThresholdsConfig::is_empty")]
    pub thresholds: ThresholdsConfig,

    /// Default values of run environment variables
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Engine options
    pub options: options::OptionsConfig,

    /// HTTP target configuration
    pub http: HttpConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl StampedeConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.scenarios.validate()?;
        self.thresholds.validate()?;
        self.options.validate()?;
        self.http.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Scenario set to run; `only` restricts it to one scenario
    pub fn scenario_specs(&self, only: Option<&str>) -> ConfigResult<Vec<ScenarioSpec>> {
        self.scenarios.to_specs(only)
    }

    pub fn threshold_set(&self) -> ConfigResult<ThresholdSet> {
        self.thresholds.to_threshold_set()
    }

    pub fn trend_stats(&self) -> ConfigResult<Vec<TrendStat>> {
        self.options.trend_stats()
    }

    /// Sample plan: smoke, load, stress, spike and soak scenarios run back
    /// to back against a REST API
    pub fn sample() -> Self {
        let mut scenarios = ScenariosConfig::default();
        let think_time = Some(ThinkTime::between(
            Duration::from_secs(1),
            Duration::from_secs(3),
        ));
        let tagged = |mut scenario: ScenarioConfig, name: &str| {
            scenario.tags.insert("test_type".to_string(), name.to_string());
            scenario
                .env_overrides
                .insert("SCENARIO".to_string(), name.to_string());
            scenario.think_time = think_time;
            scenario
        };
        let stages = |plan: &[(u64, u32)]| {
            plan.iter()
                .map(|(secs, target)| Stage::new(Duration::from_secs(*secs), *target))
                .collect::<Vec<_>>()
        };

        scenarios.insert(
            "smoke",
            tagged(
                ScenarioConfig {
                    graceful_stop: Duration::from_secs(5),
                    ..ScenarioConfig::constant(1, Duration::from_secs(30))
                },
                "smoke",
            ),
        );
        scenarios.insert(
            "load",
            tagged(
                ScenarioConfig {
                    start_offset: Duration::from_secs(35),
                    ..ScenarioConfig::ramping(
                        0,
                        stages(&[(120, 50), (300, 50), (120, 100), (300, 100), (120, 0)]),
                    )
                },
                "load",
            ),
        );
        scenarios.insert(
            "stress",
            tagged(
                ScenarioConfig {
                    start_offset: Duration::from_secs(20 * 60),
                    graceful_stop: Duration::from_secs(60),
                    ..ScenarioConfig::ramping(
                        0,
                        stages(&[
                            (120, 100),
                            (180, 200),
                            (180, 300),
                            (180, 400),
                            (300, 400),
                            (300, 0),
                        ]),
                    )
                },
                "stress",
            ),
        );
        scenarios.insert(
            "spike",
            tagged(
                ScenarioConfig {
                    start_offset: Duration::from_secs(45 * 60),
                    ..ScenarioConfig::ramping(
                        0,
                        stages(&[(60, 50), (10, 500), (180, 500), (10, 50), (180, 50), (60, 0)]),
                    )
                },
                "spike",
            ),
        );
        scenarios.insert(
            "soak",
            tagged(
                ScenarioConfig {
                    start_offset: Duration::from_secs(55 * 60),
                    graceful_stop: Duration::from_secs(60),
                    ..ScenarioConfig::constant(100, Duration::from_secs(60 * 60))
                },
                "soak",
            ),
        );

        let mut thresholds = ThresholdsConfig::default();
        let predicates: [(&str, &[&str]); 8] = [
            ("http_req_failed", &["rate<0.01"]),
            ("http_req_duration", &["p(95)<500", "p(99)<1000"]),
            ("http_req_duration{endpoint:debts}", &["p(95)<300"]),
            ("http_req_duration{endpoint:payments}", &["p(95)<500"]),
            ("http_req_duration{endpoint:users}", &["p(95)<200"]),
            ("errors{endpoint:debts}", &["rate<0.01"]),
            ("errors{endpoint:payments}", &["rate<0.02"]),
            ("http_reqs{endpoint:debts}", &["rate>50"]),
        ];
        for (selector, list) in predicates {
            for predicate in list {
                thresholds.add(selector, ThresholdEntry::Predicate(predicate.to_string()));
            }
        }

        let env = [
            ("BASE_URL", "http://localhost:5000"),
            ("API_VERSION", "v2"),
            ("SCENARIO", "default"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let credentials = json!({"email": "test1@example.com", "password": "TestPass123!"});
        let http = HttpConfig {
            login: Some(LoginConfig {
                path: "/auth/login".to_string(),
                body: credentials.clone(),
                token_field: "access_token".to_string(),
            }),
            endpoints: vec![
                EndpointConfig::get("login", "/auth/login")
                    .unauthenticated()
                    .with_method("POST")
                    .with_body(credentials)
                    .with_required_field("access_token")
                    .with_outcome_counters(Some("successful_logins"), Some("failed_logins"))
                    .with_duration_trend("login_duration"),
                EndpointConfig::get("debts", "/debts?page={rand_int:1:10}&per_page={rand_int:10:50}")
                    .with_operation("list")
                    .with_required_field("data")
                    .with_required_field("pagination")
                    .with_cache_tracking(),
                EndpointConfig::get("debts", "/debts/debt-{rand_string:8}")
                    .with_operation("get")
                    .with_expected_status(vec![200, 404]),
                EndpointConfig::get("debts", "/debts")
                    .with_operation("create")
                    .with_method("POST")
                    .with_probability(0.3)
                    .with_expected_status(vec![201])
                    .with_required_field("id")
                    .with_outcome_counters(Some("debts_created"), None)
                    .with_duration_trend("debt_creation_duration")
                    .with_body(json!({
                        "debtor_id": "debtor-{rand_string:8}",
                        "creditor_id": "creditor-{rand_string:8}",
                        "original_amount": "{rand_int:100:50000}",
                    })),
                EndpointConfig::get("payments", "/payments").with_operation("list"),
                EndpointConfig::get("payments", "/payments")
                    .with_operation("create")
                    .with_method("POST")
                    .with_probability(0.2)
                    .with_expected_status(vec![201, 400])
                    .with_success_status(vec![201])
                    .with_outcome_counters(Some("payments_processed"), None)
                    .with_duration_trend("payment_duration")
                    .with_body(json!({
                        "debt_id": "debt-{rand_string:8}",
                        "amount": "{rand_int:10:1000}",
                    })),
                EndpointConfig::get("users", "/users/me")
                    .with_operation("profile")
                    .with_expected_status(vec![200, 401]),
                EndpointConfig::get("search", "/search?q={rand_string:6}")
                    .with_max_duration(Duration::from_secs(1)),
            ],
            vu_gauge: Some("active_users".to_string()),
            ..HttpConfig::default()
        };

        Self {
            scenarios,
            thresholds,
            env,
            options: options::OptionsConfig::default(),
            http,
            logging: logging::LoggingConfig::default(),
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        serde_yaml::to_string(&Self::sample())
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
