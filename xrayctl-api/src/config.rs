//! HTTP API settings loaded from the environment.

use tracing_subscriber::EnvFilter;

use xrayctl_core::config::{
    ConfigError, ManagementConfig, RateLimitConfig, SessionLimitConfig,
};

/// Environment variable holding the shared API key.
pub const API_KEY_ENV: &str = "API_KEY";

/// Environment variable holding the fallback log level.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

const DEFAULT_LOG_LEVEL: &str = "info";

/// Complete runtime configuration for the API process.
#[derive(Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub management: ManagementConfig,
    pub rate_limit: RateLimitConfig,
    pub sessions: SessionLimitConfig,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &"<redacted>")
            .field("management", &self.management)
            .field("rate_limit", &self.rate_limit)
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl ApiConfig {
    /// Load every section from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the API key is missing or blank, or when the
    /// management endpoint is invalid (for example not loopback).
    ///
    /// The key is kept exactly as set; only an all-blank value is rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar { var: API_KEY_ENV })?;

        Ok(Self {
            api_key,
            management: ManagementConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env(),
            sessions: SessionLimitConfig::from_env(),
        })
    }
}

/// `LOG_LEVEL` as a tracing level name, or `info`.
///
/// Accepts the conventional `WARNING`/`CRITICAL` spellings, which tracing
/// would otherwise parse as target names.
pub fn log_level_from_env() -> String {
    let level = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    match level.as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        _ => level,
    }
}

/// Log filter: `RUST_LOG` when set and valid, else `LOG_LEVEL`, else `info`.
///
/// Read straight from the environment so logging is up before
/// [`ApiConfig::from_env`] emits its warnings.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level_from_env()))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}
