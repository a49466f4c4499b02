//! Request throttling middleware.
//!
//! Callers are identified by the first `X-Forwarded-For` entry, then
//! `X-Real-IP`, then the socket peer address. The headers are trusted as-is:
//! the API is expected to sit behind a reverse proxy that sets them.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

const UNKNOWN_CLIENT: &str = "unknown";

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Resolve the identity a request is throttled under.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_value(headers, "x-forwarded-for") {
        if let Some(first) = forwarded
            .split(',')
            .map(str::trim)
            .find(|entry| !entry.is_empty())
        {
            return first.to_string();
        }
    }
    if let Some(real_ip) = header_value(headers, "x-real-ip") {
        return real_ip.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Middleware admitting at most the configured number of requests per
/// caller within the sliding window.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), peer);

    if !state.rate_limiter.allow(&identity) {
        state.metrics.rate_limited_total.inc();
        warn!(client = %identity, path = %request.uri().path(), "rate_limited");
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(request).await)
}
