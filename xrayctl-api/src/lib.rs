//! HTTP control API for provisioning proxy users.
//!
//! Wraps a [`xrayctl_core::ManagementClient`] behind an axum router with
//! shared-key authentication, per-caller throttling and a health check.

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use server::{ApiServer, ApiServerConfig};
pub use state::AppState;
