//! Router-level tests against an in-memory management service.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use xrayctl_api::config::ApiConfig;
use xrayctl_api::{AppState, router};
use xrayctl_core::ManagementClient;
use xrayctl_core::config::{ManagementConfig, RateLimitConfig, SessionLimitConfig};
use xrayctl_core::management::testing::InMemoryService;

const KEY: &str = "test-key";
const TAG: &str = "vless-reality";
const USER: &str = "5783a3e7-e373-51cd-8642-c83782b807c5";

struct Harness {
    service: InMemoryService,
    state: AppState,
}

impl Harness {
    fn new() -> Self {
        Self::with_rate_limit(1_000)
    }

    fn with_rate_limit(max_requests: usize) -> Self {
        Self::with_config(ApiConfig {
            api_key: KEY.to_string(),
            management: ManagementConfig::default(),
            rate_limit: RateLimitConfig {
                max_requests,
                window: Duration::from_secs(60),
            },
            sessions: SessionLimitConfig::default(),
        })
    }

    fn with_config(config: ApiConfig) -> Self {
        let service = InMemoryService::new();
        let client =
            ManagementClient::with_connector(config.management.clone(), service.connector())
                .unwrap();
        let state = AppState::new(&config, Arc::new(client));
        Self { service, state }
    }

    fn router(&self) -> Router {
        router(self.state.clone())
    }
}

fn post_user(path: &str, key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("X-API-KEY", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_add_user_creates_user() {
    let harness = Harness::new();
    let response = harness
        .router()
        .oneshot(post_user("/add_user", Some(KEY), json!({ "uuid": USER })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
    assert!(harness.service.emails(TAG).contains(USER));
}

#[tokio::test]
async fn test_add_user_twice_is_ok() {
    let harness = Harness::new();
    for _ in 0..2 {
        let response = harness
            .router()
            .oneshot(post_user("/add_user", Some(KEY), json!({ "uuid": USER })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(harness.service.emails(TAG).len(), 1);
}

#[tokio::test]
async fn test_remove_missing_user_is_ok() {
    let harness = Harness::new();
    let response = harness
        .router()
        .oneshot(post_user("/remove_user", Some(KEY), json!({ "uuid": USER })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_add_then_remove() {
    let harness = Harness::new();
    harness
        .router()
        .oneshot(post_user("/add_user", Some(KEY), json!({ "uuid": USER })))
        .await
        .unwrap();
    let response = harness
        .router()
        .oneshot(post_user("/remove_user", Some(KEY), json!({ "uuid": USER })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(harness.service.emails(TAG).is_empty());
}

#[tokio::test]
async fn test_missing_or_wrong_key_is_forbidden() {
    let harness = Harness::new();

    let response = harness
        .router()
        .oneshot(post_user("/add_user", None, json!({ "uuid": USER })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await, json!({ "detail": "Forbidden" }));

    let response = harness
        .router()
        .oneshot(post_user("/remove_user", Some("nope"), json!({ "uuid": USER })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(harness.service.emails(TAG).is_empty());
}

#[tokio::test]
async fn test_auth_checked_before_body() {
    let harness = Harness::new();
    let response = harness
        .router()
        .oneshot(post_user("/add_user", None, json!({ "bogus": true })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_bodies_are_rejected() {
    let harness = Harness::new();

    let response = harness
        .router()
        .oneshot(post_user("/add_user", Some(KEY), json!({ "uuid": "not-a-uuid" })))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert!(json_body(response).await["detail"].is_string());

    let response = harness
        .router()
        .oneshot(post_user(
            "/add_user",
            Some(KEY),
            json!({ "uuid": USER, "level": 1 }),
        ))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert!(harness.service.emails(TAG).is_empty());
}

#[tokio::test]
async fn test_unreachable_management_maps_to_503() {
    let harness = Harness::new();
    harness.service.set_reachable(false);

    let response = harness
        .router()
        .oneshot(post_user("/add_user", Some(KEY), json!({ "uuid": USER })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await, json!({ "detail": "Xray unavailable" }));
}

#[tokio::test]
async fn test_health_reports_reachability() {
    let harness = Harness::new();

    let response = harness.router().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));

    harness.service.set_reachable(false);
    let response = harness.router().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await, json!({ "status": "degraded" }));
}

#[tokio::test]
async fn test_rate_limit_applies_to_all_routes() {
    let harness = Harness::with_rate_limit(2);
    let router = harness.router();

    for _ in 0..2 {
        let response = router.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Unauthenticated requests still count against the caller.
    let response = router
        .clone()
        .oneshot(post_user("/add_user", None, json!({ "uuid": USER })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(response).await, json!({ "detail": "Too many requests" }));

    // A different forwarded address has its own window.
    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header("x-forwarded-for", "203.0.113.5")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint_counts_operations() {
    let harness = Harness::new();
    harness
        .router()
        .oneshot(post_user("/add_user", Some(KEY), json!({ "uuid": USER })))
        .await
        .unwrap();

    let response = harness.router().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(
        "xrayctl_user_operations_total{operation=\"add_user\",outcome=\"created\"} 1"
    ));
}

#[tokio::test]
async fn test_state_carries_session_accounting_config() {
    let harness = Harness::with_config(ApiConfig {
        api_key: KEY.to_string(),
        management: ManagementConfig::default(),
        rate_limit: RateLimitConfig::default(),
        sessions: SessionLimitConfig {
            max_sessions: 2,
            log_only: true,
        },
    });

    let sessions = &harness.state.sessions;
    assert_eq!(sessions.max_sessions(), 2);
    assert!(sessions.log_only());

    // Independent of the add/remove routes.
    harness
        .router()
        .oneshot(post_user("/add_user", Some(KEY), json!({ "uuid": USER })))
        .await
        .unwrap();
    assert_eq!(sessions.active_sessions(USER), 0);
}
