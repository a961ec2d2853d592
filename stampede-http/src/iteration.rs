//! The HTTP iteration routine

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use stampede_config::EndpointConfig;
use stampede_core::{IterationError, TagSet};
use stampede_metrics::names;
use stampede_runtime::{Iteration, IterationContext};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::client::HttpTarget;
use crate::errors::HttpError;
use crate::lifecycle::TOKEN_KEY;
use crate::template::expand_json;
use crate::types::HttpMethod;

const CACHE_HEADER: &str = "x-cache";

#[derive(Debug, Clone)]
struct Endpoint {
    config: EndpointConfig,
    method: HttpMethod,
    tags: TagSet,
    label: String,
    check: String,
}

impl Endpoint {
    fn is_success(&self, status: u16) -> bool {
        let statuses = if self.config.success_status.is_empty() {
            &self.config.expected_status
        } else {
            &self.config.success_status
        };
        statuses.contains(&status)
    }

    /// Record the configured response checks; `true` when all of them hold
    fn record_checks(&self, ctx: &IterationContext, body: &[u8], duration_ms: f64) -> bool {
        let checks = &self.config.checks;
        let mut passed = true;
        if !checks.fields.is_empty() {
            let document: Option<JsonValue> = serde_json::from_slice(body).ok();
            for field in &checks.fields {
                let present = document
                    .as_ref()
                    .is_some_and(|document| has_field(document, field));
                passed &= ctx.check(
                    &format!("{} has {}", self.label, field),
                    present,
                    &self.tags,
                );
            }
        }
        if let Some(limit) = checks.max_duration {
            let within = duration_ms <= limit.as_secs_f64() * 1000.0;
            passed &= ctx.check(
                &format!("{} responds within {:?}", self.label, limit),
                within,
                &self.tags,
            );
        }
        passed
    }

    fn new(config: EndpointConfig) -> Result<Self, HttpError> {
        let method: HttpMethod = config.method.parse()?;
        let mut tags = TagSet::new().with(names::tags::ENDPOINT, config.name.as_str());
        let label = match &config.operation {
            Some(operation) => {
                tags.insert(names::tags::OPERATION, operation.as_str());
                format!("{} {}", config.name, operation)
            }
            None => config.name.clone(),
        };
        Ok(Self {
            check: format!("{} status is expected", label),
            label,
            config,
            method,
            tags,
        })
    }
}

/// Issues the configured endpoints in order, each with its probability
///
/// Status mismatches are recorded on `http_req_failed`, `checks` and
/// `errors` without failing the iteration; transport errors also fail it.
#[derive(Debug, Clone)]
pub struct HttpIteration {
    target: HttpTarget,
    endpoints: Vec<Endpoint>,
}

impl HttpIteration {
    pub fn new(target: HttpTarget) -> Result<Self, HttpError> {
        let endpoints = target
            .config()
            .endpoints
            .iter()
            .cloned()
            .map(Endpoint::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { target, endpoints })
    }

    async fn issue(
        &self,
        ctx: &IterationContext,
        endpoint: &Endpoint,
        token: Option<&str>,
    ) -> Result<(), HttpError> {
        let lookup = |name: &str| ctx.env(name).map(str::to_string);
        let (url, body) = ctx.with_rng(|rng| -> Result<(String, Option<JsonValue>), HttpError> {
            let url = self.target.api_url(&endpoint.config.path, &lookup, &mut *rng)?;
            let body = match &endpoint.config.body {
                Some(body) => Some(expand_json(body, &lookup, &mut *rng)?),
                None => None,
            };
            Ok((url, body))
        })?;

        let mut request = self
            .target
            .client()
            .request(endpoint.method.into(), &url);
        if endpoint.config.authenticated {
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let started = Instant::now();
        let outcome = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let cache_hit = response
                    .headers()
                    .get(CACHE_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .is_some_and(|value| value.eq_ignore_ascii_case("HIT"));
                response.bytes().await.map(|body| (status, cache_hit, body))
            }
            Err(e) => Err(e),
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let tags = &endpoint.tags;
        ctx.add_counter(names::HTTP_REQS, 1.0, tags)?;
        ctx.add_trend(names::HTTP_REQ_DURATION, duration_ms, tags)?;
        if let Some(trend) = &endpoint.config.duration_trend {
            ctx.add_trend(trend, duration_ms, tags)?;
        }

        let (status, cache_hit, body) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                ctx.add_rate(names::HTTP_REQ_FAILED, true, tags)?;
                ctx.check(&endpoint.check, false, tags);
                ctx.add_counter(names::ERRORS, 1.0, tags)?;
                if let Some(counter) = &endpoint.config.failure_counter {
                    ctx.add_counter(counter, 1.0, tags)?;
                }
                return Err(e.into());
            }
        };

        let expected = endpoint.config.expected_status.contains(&status);
        ctx.add_rate(names::HTTP_REQ_FAILED, !expected, tags)?;
        ctx.check(&endpoint.check, expected, tags);
        let checks_passed = endpoint.record_checks(ctx, &body, duration_ms);
        if !expected {
            debug!(
                endpoint = %endpoint.config.name,
                method = %endpoint.method,
                url = %url,
                status,
                "Unexpected status"
            );
        }
        if !(expected && checks_passed) {
            ctx.add_counter(names::ERRORS, 1.0, tags)?;
        }

        let succeeded = checks_passed && endpoint.is_success(status);
        let outcome_counter = if succeeded {
            &endpoint.config.success_counter
        } else {
            &endpoint.config.failure_counter
        };
        if let Some(counter) = outcome_counter {
            ctx.add_counter(counter, 1.0, tags)?;
        }
        if endpoint.config.track_cache {
            ctx.add_rate(names::CACHE_HIT_RATE, cache_hit, tags)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Iteration for HttpIteration {
    async fn run(&self, ctx: IterationContext) -> Result<(), IterationError> {
        let token = ctx.run().get_str(TOKEN_KEY).map(str::to_string);
        if let Some(gauge) = &self.target.config().vu_gauge {
            ctx.set_gauge(gauge, ctx.vu_id() as f64, &TagSet::new())
                .map_err(HttpError::from)?;
        }
        let mut first_error: Option<HttpError> = None;

        for endpoint in &self.endpoints {
            if !ctx.random_bool(endpoint.config.probability) {
                continue;
            }
            if let Err(e) = self.issue(&ctx, endpoint, token.as_deref()).await {
                warn!(
                    vu = ctx.vu_id(),
                    endpoint = %endpoint.config.name,
                    error = %e,
                    "Request failed"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Whether `document` holds the dotted `path`
fn has_field(document: &JsonValue, path: &str) -> bool {
    path.split('.')
        .try_fold(document, |value, key| value.get(key))
        .is_some()
}
