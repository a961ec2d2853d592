//! Health check and login performed once per run

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use stampede_config::LoginConfig;
use stampede_core::{EnvOverrides, SetupError, TeardownError, TestRunContext};
use stampede_runtime::Lifecycle;
use tracing::{info, warn};

use crate::client::HttpTarget;
use crate::errors::HttpError;
use crate::template::expand_json;

/// Context key holding the bearer token obtained by setup
pub const TOKEN_KEY: &str = "token";

/// Setup verifies the target answers its health check, then logs in when a
/// login is configured. The token, or `null`, is shared with every iteration.
#[derive(Debug, Clone)]
pub struct HttpLifecycle {
    target: HttpTarget,
}

impl HttpLifecycle {
    pub fn new(target: HttpTarget) -> Self {
        Self { target }
    }

    async fn check_health<E>(&self, env: &E) -> Result<(), HttpError>
    where
        E: Fn(&str) -> Option<String> + Sync,
    {
        let url = self.target.health_url(env);
        let response = self.target.client().get(&url).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(HttpError::UnexpectedStatus { status, url });
        }
        Ok(())
    }

    /// Token from the login response; `None` when the login is rejected or unreachable
    async fn login<E>(&self, login: &LoginConfig, env: &E) -> Result<Option<String>, HttpError>
    where
        E: Fn(&str) -> Option<String> + Sync,
    {
        let (url, body) = {
            let mut rng = rand::rng();
            let url = self.target.api_url(&login.path, env, &mut rng)?;
            let body = expand_json(&login.body, env, &mut rng)?;
            (url, body)
        };

        let response = match self.target.client().post(&url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Login request failed");
                return Ok(None);
            }
        };
        let status = response.status().as_u16();
        if status != 200 {
            warn!(url = %url, status, "Login rejected");
            return Ok(None);
        }

        let payload: JsonValue = match response.json().await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(url = %url, error = %e, "Login response is not JSON");
                return Ok(None);
            }
        };
        let token = payload
            .get(&login.token_field)
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        if token.is_none() {
            warn!(field = %login.token_field, "Login response has no token");
        }
        Ok(token)
    }
}

#[async_trait]
impl Lifecycle for HttpLifecycle {
    async fn setup(&self, env: &EnvOverrides) -> Result<JsonValue, SetupError> {
        let lookup = |name: &str| env.get(name).map(str::to_string);
        info!(
            target_url = %self.target.base_url(&lookup),
            scenario = env.active_scenario(),
            "Starting load test"
        );

        self.check_health(&lookup)
            .await
            .map_err(|e| SetupError::Failed(format!("service not healthy: {}", e)))?;

        let token = match &self.target.config().login {
            Some(login) => {
                let token = self.login(login, &lookup).await?;
                if token.is_none() {
                    warn!("Could not obtain auth token, authenticated requests may fail");
                }
                token
            }
            None => None,
        };
        Ok(json!({ TOKEN_KEY: token }))
    }

    async fn teardown(&self, context: &TestRunContext) -> Result<(), TeardownError> {
        info!(
            started_at = %context.started_at(),
            authenticated = context.get_str(TOKEN_KEY).is_some(),
            "Load test completed"
        );
        Ok(())
    }
}
