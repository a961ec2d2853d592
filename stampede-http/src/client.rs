//! HTTP client shared by setup and iterations

use rand::Rng;
use reqwest::Client;
use stampede_config::HttpConfig;
use std::sync::Arc;
use tracing::debug;

use crate::errors::HttpError;
use crate::template::expand;

/// Environment variable overriding the configured base URL
pub const BASE_URL_ENV: &str = "BASE_URL";

/// Connection pool and target description used by every request of a run
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: Client,
    config: Arc<HttpConfig>,
}

impl HttpTarget {
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        debug!(
            timeout = ?config.timeout,
            user_agent = %config.user_agent,
            "Creating HTTP client"
        );
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// `BASE_URL` when set, otherwise the configured base, without a trailing slash
    pub fn base_url<E>(&self, env: &E) -> String
    where
        E: Fn(&str) -> Option<String>,
    {
        env(BASE_URL_ENV)
            .unwrap_or_else(|| self.config.base_url.clone())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn health_url<E>(&self, env: &E) -> String
    where
        E: Fn(&str) -> Option<String>,
    {
        format!("{}{}", self.base_url(env), self.config.health_path)
    }

    /// Base URL, API prefix and `path`, with placeholders expanded
    pub fn api_url<R, E>(&self, path: &str, env: &E, rng: &mut R) -> Result<String, HttpError>
    where
        R: Rng,
        E: Fn(&str) -> Option<String>,
    {
        let prefix = expand(&self.config.api_prefix, env, &mut *rng)?;
        let path = expand(path, env, &mut *rng)?;
        Ok(format!(
            "{}{}{}",
            self.base_url(env),
            prefix.trim_end_matches('/'),
            path
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use stampede_core::EnvOverrides;
    use std::collections::BTreeMap;

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_base_url_prefers_environment() {
        let target = HttpTarget::new(HttpConfig::default()).unwrap();
        assert_eq!(target.base_url(&vars(&[])), "http://localhost:5000");
        assert_eq!(
            target.base_url(&vars(&[("BASE_URL", "http://staging:8080/")])),
            "http://staging:8080"
        );
        assert_eq!(
            target.health_url(&vars(&[("BASE_URL", "http://staging:8080")])),
            "http://staging:8080/health"
        );
    }

    #[test]
    fn test_api_url_joins_prefix_and_path() {
        let target = HttpTarget::new(HttpConfig::default()).unwrap();
        let env = vars(&[("API_VERSION", "v2")]);
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(
            target.api_url("/auth/login", &env, &mut rng).unwrap(),
            "http://localhost:5000/api/v2/auth/login"
        );

        let page = target
            .api_url("/debts?page={rand_int:1:1}", &env, &mut rng)
            .unwrap();
        assert_eq!(page, "http://localhost:5000/api/v2/debts?page=1");
    }

    #[test]
    fn test_api_version_falls_back_to_v2() {
        let target = HttpTarget::new(HttpConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(
            target.api_url("/debts", &vars(&[]), &mut rng).unwrap(),
            "http://localhost:5000/api/v2/debts"
        );
    }

    #[test]
    fn test_process_environment_without_config_env() {
        let env = EnvOverrides::resolve_with(&BTreeMap::new(), &BTreeMap::new(), |name| {
            match name {
                "BASE_URL" => Some("http://staging:9000".to_string()),
                "API_VERSION" => Some("v3".to_string()),
                _ => None,
            }
        });
        let lookup = |name: &str| env.get(name).map(str::to_string);

        let target = HttpTarget::new(HttpConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(target.base_url(&lookup), "http://staging:9000");
        assert_eq!(
            target.api_url("/debts", &lookup, &mut rng).unwrap(),
            "http://staging:9000/api/v3/debts"
        );
    }

    #[test]
    fn test_api_url_requires_prefix_variables() {
        let config = HttpConfig {
            api_prefix: "/api/{env:API_VERSION}".to_string(),
            ..HttpConfig::default()
        };
        let target = HttpTarget::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        assert!(matches!(
            target.api_url("/debts", &vars(&[]), &mut rng),
            Err(HttpError::MissingVariable(name)) if name == "API_VERSION"
        ));
    }
}
