//! Route table and handlers.
//!
//! | Route | Auth | Purpose |
//! |-------|------|---------|
//! | `POST /add_user` | API key | Ensure a user exists on the inbound |
//! | `POST /remove_user` | API key | Ensure a user is absent |
//! | `GET /health` | none | Management channel reachability |
//! | `GET /metrics` | none | OpenMetrics exposition |
//!
//! Every route is rate limited before anything else runs.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::require_api_key;
use crate::error::{ApiError, ApiResult};
use crate::metrics::metrics_handler;
use crate::rate_limit::rate_limit;
use crate::state::AppState;

/// Body of `POST /add_user` and `POST /remove_user`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRequest {
    #[serde(deserialize_with = "trimmed_uuid")]
    pub uuid: Uuid,
}

fn trimmed_uuid<'de, D>(deserializer: D) -> Result<Uuid, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Uuid::parse_str(raw.trim()).map_err(serde::de::Error::custom)
}

/// `{"status": "..."}` response body.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
}

const OK: StatusBody = StatusBody { status: "ok" };

fn parse_body(payload: Result<Json<UserRequest>, JsonRejection>) -> ApiResult<Uuid> {
    payload
        .map(|Json(body)| body.uuid)
        .map_err(|rejection| ApiError::InvalidBody {
            status: rejection.status(),
            message: rejection.body_text(),
        })
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/add_user", post(add_user))
        .route("/remove_user", post(remove_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .merge(protected)
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .with_state(state)
}

async fn add_user(
    State(state): State<AppState>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> ApiResult<Json<StatusBody>> {
    let uuid = parse_body(payload)?.to_string();

    match state.client.add_user(&uuid).await {
        Ok(created) => {
            let outcome = if created { "created" } else { "existing" };
            state.metrics.record_operation("add_user", outcome);
            info!(uuid = %uuid, created, "user_added");
            Ok(Json(OK))
        }
        Err(e) => {
            state.metrics.record_operation("add_user", "error");
            Err(e.into())
        }
    }
}

async fn remove_user(
    State(state): State<AppState>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> ApiResult<Json<StatusBody>> {
    let uuid = parse_body(payload)?.to_string();

    match state.client.remove_user(&uuid).await {
        Ok(removed) => {
            let outcome = if removed { "removed" } else { "absent" };
            state.metrics.record_operation("remove_user", outcome);
            info!(uuid = %uuid, removed, "user_removed");
            Ok(Json(OK))
        }
        Err(e) => {
            state.metrics.record_operation("remove_user", "error");
            Err(e.into())
        }
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    if state.client.check_health().await {
        (StatusCode::OK, Json(OK))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StatusBody { status: "degraded" }),
        )
    }
}
