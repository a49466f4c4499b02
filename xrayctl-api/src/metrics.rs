//! Prometheus metrics for the control API.
//!
//! Counter names are registered without the `_total` suffix; the
//! OpenMetrics encoder appends it.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use tracing::error;

use crate::state::AppState;

/// Labels for user-operation counters.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    /// "add_user" or "remove_user"
    pub operation: String,
    /// "created", "existing", "removed", "absent" or "error"
    pub outcome: String,
}

/// All metrics exported by the API.
pub struct ApiMetrics {
    pub user_operations_total: Family<OperationLabels, Counter>,
    pub rate_limited_total: Counter,
}

impl ApiMetrics {
    /// Create and register all metrics with the given registry.
    pub fn new(registry: &mut Registry) -> Self {
        let user_operations_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "xrayctl_user_operations",
            "User add/remove operations by outcome",
            user_operations_total.clone(),
        );

        let rate_limited_total = Counter::default();
        registry.register(
            "xrayctl_rate_limited",
            "Requests rejected by the rate limiter",
            rate_limited_total.clone(),
        );

        Self {
            user_operations_total,
            rate_limited_total,
        }
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.user_operations_total
            .get_or_create(&OperationLabels {
                operation: operation.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }
}

/// `GET /metrics` in OpenMetrics text format.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    let mut buffer = String::new();

    if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &state.registry) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_names() {
        let mut registry = Registry::default();
        let metrics = ApiMetrics::new(&mut registry);
        metrics.record_operation("add_user", "created");
        metrics.rate_limited_total.inc();

        let mut out = String::new();
        prometheus_client::encoding::text::encode(&mut out, &registry).unwrap();
        assert!(out.contains(
            "xrayctl_user_operations_total{operation=\"add_user\",outcome=\"created\"} 1"
        ));
        assert!(out.contains("xrayctl_rate_limited_total 1"));
    }
}
