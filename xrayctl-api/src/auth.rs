//! Shared-key authentication for the mutating routes.
//!
//! The configured key is stored only as a SHA-256 digest. Presented keys are
//! hashed the same way and the two fixed-length digests are compared with an
//! XOR fold, so the comparison time does not depend on where the first
//! mismatching byte is.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Digest of the configured API key.
#[derive(Clone)]
pub struct ApiKey {
    digest: [u8; 32],
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl ApiKey {
    pub fn new(key: &str) -> Self {
        Self { digest: digest(key) }
    }

    /// Whether `presented` matches the configured key.
    pub fn verify(&self, presented: &str) -> bool {
        constant_time_eq(&self.digest, &digest(presented))
    }

    /// Check the `X-API-KEY` header.
    pub fn verify_headers(&self, headers: &HeaderMap) -> bool {
        headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|presented| self.verify(presented))
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Middleware rejecting requests without a valid `X-API-KEY` header.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.api_key.verify_headers(request.headers()) {
        debug!(path = %request.uri().path(), "Rejected request with missing or invalid API key");
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(request).await)
}
