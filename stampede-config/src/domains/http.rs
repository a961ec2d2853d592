//! HTTP target configuration

use crate::error::ConfigResult;
use crate::validation::{
    validate_duration, validate_enum_choice, validate_fraction, validate_positive,
    validate_required_string, validate_url, Validatable,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

const METHODS: [&str; 6] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// HTTP client and target configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Target used when the `BASE_URL` variable is not set
    pub base_url: String,

    /// Prefix joined in front of login and endpoint paths;
    /// `{env:NAME}` and `{env:NAME:fallback}` placeholders are resolved
    /// from the run environment
    pub api_prefix: String,

    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Whether to verify TLS certificates
    #[serde(default = "crate::domains::utils::default_true")]
    pub verify_ssl: bool,

    /// Maximum idle connections per host
    pub max_idle_per_host: usize,

    /// Health path requested by setup; must answer 200
    pub health_path: String,

    /// Optional login performed once by setup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginConfig>,

    /// Requests issued by each iteration, in order
    pub endpoints: Vec<EndpointConfig>,

    /// Gauge set to the virtual user id at the start of every iteration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vu_gauge: Option<String>,
}

/// Login request whose token is shared with every iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "default_login_path")]
    pub path: String,

    /// JSON credentials posted as the request body
    pub body: JsonValue,

    /// Field of the response holding the bearer token
    #[serde(default = "default_token_field")]
    pub token_field: String,
}

/// One request of the iteration routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Value of the `endpoint` tag
    pub name: String,

    /// Value of the `operation` tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    #[serde(default = "default_method")]
    pub method: String,

    /// Path below the API prefix; supports `{rand_int:a:b}`,
    /// `{rand_string:n}` and `{env:NAME}` placeholders
    pub path: String,

    /// Chance that an iteration issues this request
    #[serde(default = "default_probability")]
    pub probability: f64,

    /// Statuses counted as success
    #[serde(default = "default_expected_status")]
    pub expected_status: Vec<u16>,

    /// JSON body; string values support the same placeholders as `path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,

    /// Record `cache_hit_rate` from the `X-Cache` response header
    #[serde(default = "crate::domains::utils::default_false")]
    pub track_cache: bool,

    /// Send the setup token as a bearer credential
    #[serde(default = "crate::domains::utils::default_true")]
    pub authenticated: bool,

    /// Assertions on the response beyond its status
    #[serde(default, skip_serializing_if = "ResponseChecks::is_empty")]
    pub checks: ResponseChecks,

    /// Statuses counted as a business success; `expected_status` when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success_status: Vec<u16>,

    /// Counter incremented when the status is a success and every check passes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_counter: Option<String>,

    /// Counter incremented otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_counter: Option<String>,

    /// Extra trend receiving this endpoint's request duration, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_trend: Option<String>,
}

/// Assertions on a response, each recorded on the `checks` rate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseChecks {
    /// Fields the JSON body must hold; dots address nested fields
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,

    /// Upper bound on the request duration
    #[serde(
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_duration: Option<Duration>,
}

impl ResponseChecks {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.max_duration.is_none()
    }
}

impl EndpointConfig {
    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operation: None,
            method: default_method(),
            path: path.into(),
            probability: default_probability(),
            expected_status: default_expected_status(),
            body: None,
            track_cache: false,
            authenticated: true,
            checks: ResponseChecks::default(),
            success_status: Vec::new(),
            success_counter: None,
            failure_counter: None,
            duration_trend: None,
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    pub fn with_expected_status(mut self, statuses: Vec<u16>) -> Self {
        self.expected_status = statuses;
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_cache_tracking(mut self) -> Self {
        self.track_cache = true;
        self
    }

    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Require `field` in the JSON response body
    pub fn with_required_field(mut self, field: impl Into<String>) -> Self {
        self.checks.fields.push(field.into());
        self
    }

    pub fn with_max_duration(mut self, limit: Duration) -> Self {
        self.checks.max_duration = Some(limit);
        self
    }

    pub fn with_success_status(mut self, statuses: Vec<u16>) -> Self {
        self.success_status = statuses;
        self
    }

    /// Name the counters recording business outcomes
    pub fn with_outcome_counters(
        mut self,
        success: Option<&str>,
        failure: Option<&str>,
    ) -> Self {
        self.success_counter = success.map(str::to_string);
        self.failure_counter = failure.map(str::to_string);
        self
    }

    pub fn with_duration_trend(mut self, name: impl Into<String>) -> Self {
        self.duration_trend = Some(name.into());
        self
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            api_prefix: "/api/{env:API_VERSION:v2}".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: default_user_agent(),
            verify_ssl: true,
            max_idle_per_host: 32,
            health_path: "/health".to_string(),
            login: None,
            endpoints: Vec::new(),
            vu_gauge: None,
        }
    }
}

impl Validatable for HttpConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_url(&self.base_url, "base_url", self.domain_name())?;
        validate_duration(self.timeout, "timeout", self.domain_name())?;
        validate_required_string(&self.user_agent, "user_agent", self.domain_name())?;
        validate_positive(self.max_idle_per_host, "max_idle_per_host", self.domain_name())?;
        validate_path(&self.health_path, "health_path", self.domain_name())?;

        if let Some(ref login) = self.login {
            login.validate()?;
        }

        for endpoint in &self.endpoints {
            endpoint.validate()?;
        }
        if let Some(ref gauge) = self.vu_gauge {
            validate_metric_name(gauge, "vu_gauge", self.domain_name())?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "http"
    }
}

impl Validatable for LoginConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_path(&self.path, "path", self.domain_name())?;
        validate_required_string(&self.token_field, "token_field", self.domain_name())?;
        if !self.body.is_object() {
            return Err(self.validation_error("body must be a JSON object"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "http.login"
    }
}

impl Validatable for EndpointConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;
        validate_enum_choice(&self.method, &METHODS, "method", self.domain_name())?;
        validate_path(&self.path, "path", self.domain_name())?;
        validate_fraction(self.probability, "probability", self.domain_name())?;

        if self.expected_status.is_empty() {
            return Err(self.validation_error(format!(
                "endpoint '{}' needs at least one expected status",
                self.name
            )));
        }
        if let Some(status) = self
            .expected_status
            .iter()
            .find(|s| !(100..=599).contains(*s))
        {
            return Err(self.validation_error(format!(
                "endpoint '{}' has invalid expected status {}",
                self.name, status
            )));
        }
        if let Some(status) = self
            .success_status
            .iter()
            .find(|s| !self.expected_status.contains(*s))
        {
            return Err(self.validation_error(format!(
                "endpoint '{}' success status {} is not an expected status",
                self.name, status
            )));
        }
        if let Some(field) = self
            .checks
            .fields
            .iter()
            .find(|f| f.is_empty() || f.split('.').any(str::is_empty))
        {
            return Err(self.validation_error(format!(
                "endpoint '{}' has an invalid field check '{}'",
                self.name, field
            )));
        }
        if let Some(limit) = self.checks.max_duration {
            validate_duration(limit, "checks.max_duration", self.domain_name())?;
        }
        for (field, name) in [
            ("success_counter", &self.success_counter),
            ("failure_counter", &self.failure_counter),
            ("duration_trend", &self.duration_trend),
        ] {
            if let Some(name) = name {
                validate_metric_name(name, field, self.domain_name())?;
            }
        }
        if self.body.is_some() && matches!(self.method.to_ascii_uppercase().as_str(), "GET" | "HEAD")
        {
            log::warn!("Endpoint '{}' sends a body with {}", self.name, self.method);
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "http.endpoints"
    }
}

fn validate_path(path: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    validate_required_string(path, field_name, domain)?;
    if !path.starts_with('/') {
        return Err(crate::error::ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must start with '/', got '{}'", field_name, path),
        });
    }
    Ok(())
}

fn validate_metric_name(name: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(crate::error::ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} '{}' is not a valid metric name", field_name, name),
        });
    }
    Ok(())
}

// Default value functions
fn default_user_agent() -> String {
    format!("stampede/{}", env!("CARGO_PKG_VERSION"))
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_token_field() -> String {
    "access_token".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_probability() -> f64 {
    1.0
}

fn default_expected_status() -> Vec<u16> {
    vec![200]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.health_path, "/health");
        assert!(config.user_agent.starts_with("stampede/"));
        assert!(config.verify_ssl);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_config_validation() {
        let mut config = HttpConfig::default();
        config.timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config = HttpConfig::default();
        config.base_url = "localhost:5000".to_string();
        assert!(config.validate().is_err());

        config = HttpConfig::default();
        config.health_path = "health".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_defaults_from_yaml() {
        let yaml = r#"
name: debts
operation: list
path: /debts?page={rand_int:1:10}
track_cache: true
"#;
        let endpoint: EndpointConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(endpoint.method, "GET");
        assert_eq!(endpoint.probability, 1.0);
        assert_eq!(endpoint.expected_status, vec![200]);
        assert!(endpoint.authenticated);
        assert!(endpoint.validate().is_ok());
    }

    #[test]
    fn test_endpoint_validation() {
        let endpoint = EndpointConfig::get("debts", "/debts").with_probability(1.5);
        assert!(endpoint.validate().is_err());

        let endpoint = EndpointConfig::get("debts", "/debts").with_method("FETCH");
        assert!(endpoint.validate().is_err());

        let endpoint = EndpointConfig::get("debts", "/debts").with_expected_status(vec![]);
        assert!(endpoint.validate().is_err());

        let endpoint = EndpointConfig::get("debts", "/debts").with_expected_status(vec![700]);
        assert!(endpoint.validate().is_err());

        let endpoint = EndpointConfig::get("debts", "/debts")
            .with_method("post")
            .with_expected_status(vec![201])
            .with_body(json!({"amount": "{rand_int:10:1000}"}));
        assert!(endpoint.validate().is_ok());
    }

    #[test]
    fn test_endpoint_checks_from_yaml() {
        let yaml = r#"
name: login
method: POST
path: /auth/login
authenticated: false
checks:
  fields: [access_token]
  max_duration: 1s
success_counter: successful_logins
failure_counter: failed_logins
duration_trend: login_duration
"#;
        let endpoint: EndpointConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(endpoint.checks.fields, vec!["access_token".to_string()]);
        assert_eq!(endpoint.checks.max_duration, Some(Duration::from_secs(1)));
        assert_eq!(endpoint.success_counter.as_deref(), Some("successful_logins"));
        assert_eq!(endpoint.failure_counter.as_deref(), Some("failed_logins"));
        assert_eq!(endpoint.duration_trend.as_deref(), Some("login_duration"));
        assert!(!endpoint.authenticated);
        assert!(endpoint.validate().is_ok());
    }

    #[test]
    fn test_endpoint_check_validation() {
        let endpoint = EndpointConfig::get("debts", "/debts").with_required_field("data..id");
        assert!(endpoint.validate().is_err());

        let endpoint = EndpointConfig::get("debts", "/debts").with_max_duration(Duration::ZERO);
        assert!(endpoint.validate().is_err());

        let endpoint = EndpointConfig::get("payments", "/payments")
            .with_expected_status(vec![201, 400])
            .with_success_status(vec![200]);
        assert!(endpoint.validate().is_err());

        let endpoint = EndpointConfig::get("debts", "/debts")
            .with_outcome_counters(Some("debts listed"), None);
        assert!(endpoint.validate().is_err());

        let config = HttpConfig {
            vu_gauge: Some("9users".to_string()),
            ..HttpConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_login_validation() {
        let login = LoginConfig {
            path: default_login_path(),
            body: json!({"email": "test1@example.com", "password": "secret"}),
            token_field: default_token_field(),
        };
        assert!(login.validate().is_ok());

        let login = LoginConfig {
            body: json!("not an object"),
            ..login
        };
        assert!(login.validate().is_err());
    }
}
