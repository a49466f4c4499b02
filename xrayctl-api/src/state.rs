//! Shared application state handed to every handler.

use std::sync::Arc;

use prometheus_client::registry::Registry;

use xrayctl_core::ManagementClient;
use xrayctl_core::limits::{SessionLimiter, SlidingWindowLimiter};

use crate::auth::ApiKey;
use crate::config::ApiConfig;
use crate::metrics::ApiMetrics;

/// Cloneable handle over the process-wide singletons.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<ManagementClient>,
    pub rate_limiter: Arc<SlidingWindowLimiter>,
    /// Session accounting; constructed for operators but not consulted by
    /// the add/remove routes.
    pub sessions: Arc<SessionLimiter>,
    pub api_key: ApiKey,
    pub metrics: Arc<ApiMetrics>,
    pub registry: Arc<Registry>,
}

impl AppState {
    /// Assemble state around an already-constructed management client.
    pub fn new(config: &ApiConfig, client: Arc<ManagementClient>) -> Self {
        let mut registry = Registry::default();
        let metrics = Arc::new(ApiMetrics::new(&mut registry));

        Self {
            client,
            rate_limiter: Arc::new(SlidingWindowLimiter::new(config.rate_limit.clone())),
            sessions: Arc::new(SessionLimiter::new(config.sessions.clone())),
            api_key: ApiKey::new(&config.api_key),
            metrics,
            registry: Arc::new(registry),
        }
    }
}
