use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use stampede_config::{HttpConfig, LoginConfig};
use stampede_core::{EnvOverrides, SetupError, TestRunContext};
use stampede_http::{http_scenario, TOKEN_KEY};
use stampede_runtime::Lifecycle;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;

async fn start_mock_target(health: StatusCode) -> SocketAddr {
    let app = Router::new()
        .route("/health", get(move || async move { health }))
        .route(
            "/api/v2/auth/login",
            post(|Json(body): Json<Value>| async move {
                if body["password"] == "TestPass123!" {
                    (StatusCode::OK, Json(json!({ "access_token": "token-abc" })))
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad credentials" })))
                }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("Mock target error: {}", e);
        }
    });
    addr
}

fn env_for(addr: SocketAddr) -> EnvOverrides {
    EnvOverrides::new(BTreeMap::from([
        ("BASE_URL".to_string(), format!("http://{}", addr)),
        ("API_VERSION".to_string(), "v2".to_string()),
    ]))
}

fn config_with_login(password: &str) -> HttpConfig {
    HttpConfig {
        login: Some(LoginConfig {
            path: "/auth/login".to_string(),
            body: json!({ "email": "test1@example.com", "password": password }),
            token_field: "access_token".to_string(),
        }),
        ..HttpConfig::default()
    }
}

#[tokio::test]
async fn test_setup_stores_login_token() {
    let addr = start_mock_target(StatusCode::OK).await;
    let (lifecycle, _) = http_scenario(config_with_login("TestPass123!")).unwrap();

    let env = env_for(addr);
    let data = lifecycle.setup(&env).await.unwrap();
    let context = TestRunContext::new(data, env);
    assert_eq!(context.get_str(TOKEN_KEY), Some("token-abc"));
    assert!(lifecycle.teardown(&context).await.is_ok());
}

#[tokio::test]
async fn test_rejected_login_leaves_null_token() {
    let addr = start_mock_target(StatusCode::OK).await;
    let (lifecycle, _) = http_scenario(config_with_login("wrong")).unwrap();

    let data = lifecycle.setup(&env_for(addr)).await.unwrap();
    assert_eq!(data, json!({ "token": null }));
}

#[tokio::test]
async fn test_setup_without_login() {
    let addr = start_mock_target(StatusCode::OK).await;
    let (lifecycle, _) = http_scenario(HttpConfig::default()).unwrap();

    let data = lifecycle.setup(&env_for(addr)).await.unwrap();
    assert_eq!(data[TOKEN_KEY], Value::Null);
}

#[tokio::test]
async fn test_unhealthy_target_fails_setup() {
    let addr = start_mock_target(StatusCode::SERVICE_UNAVAILABLE).await;
    let (lifecycle, _) = http_scenario(config_with_login("TestPass123!")).unwrap();

    let err = lifecycle.setup(&env_for(addr)).await.unwrap_err();
    match err {
        SetupError::Failed(message) => {
            assert!(message.contains("service not healthy"));
            assert!(message.contains("503"));
        }
        other => panic!("unexpected setup error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_target_fails_setup() {
    // bind and drop to get a port with nothing listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (lifecycle, _) = http_scenario(HttpConfig::default()).unwrap();
    let err = lifecycle.setup(&env_for(addr)).await.unwrap_err();
    assert!(matches!(err, SetupError::Failed(_)));
}
