//! Mock REST target shared by the integration tests

#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use stampede_config::{EndpointConfig, HttpConfig, LoginConfig};
use stampede_core::EnvOverrides;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const TOKEN: &str = "token-abc";
pub const PASSWORD: &str = "TestPass123!";

#[derive(Clone)]
struct TargetState {
    healthy: bool,
    hits: Arc<Mutex<BTreeMap<&'static str, u64>>>,
}

impl TargetState {
    fn hit(&self, route: &'static str) {
        *self.hits.lock().unwrap().entry(route).or_insert(0) += 1;
    }
}

/// In-process API with health, login, debts and payments routes
pub struct MockTarget {
    pub addr: SocketAddr,
    state: TargetState,
}

impl MockTarget {
    pub async fn start(healthy: bool) -> Self {
        let state = TargetState {
            healthy,
            hits: Arc::new(Mutex::new(BTreeMap::new())),
        };

        let app = Router::new()
            .route("/health", get(health))
            .route("/api/v2/auth/login", post(login))
            .route("/api/v2/debts", get(list_debts))
            .route("/api/v2/debts/{id}", get(get_debt))
            .route("/api/v2/payments", post(create_payment))
            .route("/api/v2/missing", get(missing))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Mock target error: {}", e);
            }
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Run environment pointing at this target
    pub fn env(&self) -> EnvOverrides {
        EnvOverrides::new(BTreeMap::from([
            ("BASE_URL".to_string(), self.base_url()),
            ("API_VERSION".to_string(), "v2".to_string()),
        ]))
    }

    pub fn hits(&self, route: &str) -> u64 {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(route)
            .copied()
            .unwrap_or(0)
    }
}

/// Login plus list/get debts, and a payment creation that never runs
pub fn http_config(password: &str) -> HttpConfig {
    HttpConfig {
        login: Some(LoginConfig {
            path: "/auth/login".to_string(),
            body: json!({ "email": "test1@example.com", "password": password }),
            token_field: "access_token".to_string(),
        }),
        endpoints: vec![
            EndpointConfig::get(
                "debts",
                "/debts?page={rand_int:1:10}&per_page={rand_int:10:50}",
            )
            .with_operation("list")
            .with_cache_tracking(),
            EndpointConfig::get("debts", "/debts/debt-{rand_string:8}")
                .with_operation("get")
                .with_expected_status(vec![200, 404]),
            EndpointConfig::get("payments", "/payments")
                .with_method("POST")
                .with_operation("create")
                .with_probability(0.0)
                .with_expected_status(vec![201])
                .with_body(json!({ "amount": "{rand_int:10:1000}" })),
        ],
        ..HttpConfig::default()
    }
}

async fn health(State(state): State<TargetState>) -> StatusCode {
    state.hit("health");
    if state.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn login(State(state): State<TargetState>, Json(body): Json<Value>) -> Response {
    state.hit("login");
    if body["password"] == PASSWORD {
        Json(json!({ "access_token": TOKEN })).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {}", TOKEN);
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str())
}

async fn list_debts(
    State(state): State<TargetState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    state.hit("list_debts");
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let page = params.get("page").and_then(|p| p.parse::<u32>().ok());
    match page {
        Some(page) if (1..=10).contains(&page) => (
            [("x-cache", "HIT")],
            Json(json!({ "data": [], "pagination": { "page": page } })),
        )
            .into_response(),
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn get_debt(State(state): State<TargetState>, Path(id): Path<String>) -> StatusCode {
    state.hit("get_debt");
    if id.starts_with("debt-") && id.len() == "debt-".len() + 8 {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    }
}

async fn create_payment(State(state): State<TargetState>) -> StatusCode {
    state.hit("create_payment");
    StatusCode::CREATED
}

async fn missing(State(state): State<TargetState>) -> StatusCode {
    state.hit("missing");
    StatusCode::NOT_FOUND
}
