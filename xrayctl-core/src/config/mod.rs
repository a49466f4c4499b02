//! Configuration for the management channel and the admission limiters.
//!
//! Values are plain structs so callers can construct them directly; the
//! `from_env` constructors are the deployment path.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `XRAY_API_HOST` | `127.0.0.1` (must be loopback) |
//! | `XRAY_API_PORT` | `10085` |
//! | `XRAY_INBOUND_TAG` | `vless-reality` |
//! | `XRAY_ACCOUNT_TYPE_URL` | `type.googleapis.com/xray.proxy.vless.Account` |
//! | `XRAY_HANDLER_SERVICE` | `xray.app.proxyman.command.HandlerService` |
//! | `XRAY_VLESS_FLOW` | empty |
//! | `XRAY_VLESS_ENCRYPTION` | `none` |
//! | `XRAY_READY_TIMEOUT_SECS` | `2` |
//! | `RATE_LIMIT_MAX_REQUESTS` | `60` |
//! | `RATE_LIMIT_WINDOW_SECS` | `60` |
//! | `MAX_CONNECTIONS_PER_USER` | `0` (disabled) |
//! | `CONNECTION_LIMIT_LOG_ONLY` | `false` |

use std::net::IpAddr;
use std::time::Duration;

use tracing::warn;

pub mod defaults;
mod error;

pub use defaults::*;
pub use error::ConfigError;

/// Host names accepted as loopback without address parsing.
const LOOPBACK_NAMES: &[&str] = &["localhost"];

/// Returns true if `host` names the local machine.
///
/// Accepts `localhost` and any IPv4/IPv6 literal in the loopback range.
/// Bracketed IPv6 literals (`[::1]`) are accepted too.
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim();
    if LOOPBACK_NAMES
        .iter()
        .any(|name| host.eq_ignore_ascii_case(name))
    {
        return true;
    }
    let literal = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    literal
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

// ============================================================================
// Management channel
// ============================================================================

/// Settings for the management client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementConfig {
    /// Management host; must be loopback.
    pub host: String,
    /// Management port.
    pub port: u16,
    /// Inbound listener tag whose users are administered.
    pub inbound_tag: String,
    /// Type URL stamped on the packed account payload.
    pub account_type_url: String,
    /// Fully-qualified service name used to route the unary calls.
    pub handler_service: String,
    /// Protocol flow tag; empty means unset.
    pub flow: String,
    /// Account encryption.
    pub encryption: String,
    /// Bounded wait for connection + readiness.
    pub ready_timeout: Duration,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MANAGEMENT_HOST.to_string(),
            port: DEFAULT_MANAGEMENT_PORT,
            inbound_tag: DEFAULT_INBOUND_TAG.to_string(),
            account_type_url: DEFAULT_ACCOUNT_TYPE_URL.to_string(),
            handler_service: DEFAULT_HANDLER_SERVICE.to_string(),
            flow: String::new(),
            encryption: DEFAULT_ENCRYPTION.to_string(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

impl ManagementConfig {
    /// Create a config targeting the given host and port with defaults elsewhere.
    pub fn with_endpoint(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// - `NonLoopbackHost` if `XRAY_API_HOST` is not a loopback address
    /// - `InvalidValue` if `XRAY_API_PORT` is not a port or `XRAY_INBOUND_TAG`
    ///   is blank
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();

        let host = env_string("XRAY_API_HOST")
            .map(|h| h.trim().to_string())
            .unwrap_or(default.host);
        if !is_loopback_host(&host) {
            return Err(ConfigError::NonLoopbackHost { host });
        }

        let port = match std::env::var("XRAY_API_PORT") {
            Ok(val) => val
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue {
                    var: "XRAY_API_PORT",
                    value: val.clone(),
                    message: e.to_string(),
                })?,
            Err(_) => default.port,
        };

        let inbound_tag = match std::env::var("XRAY_INBOUND_TAG") {
            Ok(val) if val.trim().is_empty() => {
                return Err(ConfigError::InvalidValue {
                    var: "XRAY_INBOUND_TAG",
                    value: val,
                    message: "inbound tag cannot be empty".to_string(),
                });
            }
            Ok(val) => val.trim().to_string(),
            Err(_) => default.inbound_tag,
        };

        let encryption = env_string("XRAY_VLESS_ENCRYPTION")
            .filter(|e| !e.is_empty())
            .unwrap_or(default.encryption);

        Ok(Self {
            host,
            port,
            inbound_tag,
            account_type_url: env_string("XRAY_ACCOUNT_TYPE_URL")
                .unwrap_or(default.account_type_url),
            handler_service: env_string("XRAY_HANDLER_SERVICE")
                .unwrap_or(default.handler_service),
            flow: env_string("XRAY_VLESS_FLOW").unwrap_or_default(),
            encryption,
            ready_timeout: Duration::from_secs(parse_env_warn(
                "XRAY_READY_TIMEOUT_SECS",
                default.ready_timeout.as_secs(),
            )),
        })
    }

    /// Endpoint URI for the management channel, e.g. `http://127.0.0.1:10085`.
    ///
    /// IPv6 literals are bracketed.
    pub fn endpoint_uri(&self) -> String {
        let host = self.host.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("http://[{}]:{}", host, self.port)
        } else {
            format!("http://{}:{}", host, self.port)
        }
    }

    /// `host:port` form for socket-level checks.
    pub fn socket_target(&self) -> String {
        let host = self.host.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

// ============================================================================
// Request rate limiter
// ============================================================================

/// Settings for the sliding-window request limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests admitted per identity within `window`.
    pub max_requests: usize,
    /// Length of the trailing window.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            window: DEFAULT_RATE_LIMIT_WINDOW,
        }
    }
}

impl RateLimitConfig {
    /// Load configuration from environment variables.
    ///
    /// Zero or unparseable values log a warning and keep the default.
    pub fn from_env() -> Self {
        let default = Self::default();

        let max_requests =
            parse_env_warn("RATE_LIMIT_MAX_REQUESTS", default.max_requests);
        let window_secs = parse_env_warn("RATE_LIMIT_WINDOW_SECS", default.window.as_secs());

        Self {
            max_requests: if max_requests == 0 {
                warn!(
                    env_var = "RATE_LIMIT_MAX_REQUESTS",
                    default = default.max_requests,
                    "Rate limit must be positive, using default"
                );
                default.max_requests
            } else {
                max_requests
            },
            window: if window_secs == 0 {
                warn!(
                    env_var = "RATE_LIMIT_WINDOW_SECS",
                    default = default.window.as_secs(),
                    "Rate limit window must be positive, using default"
                );
                default.window
            } else {
                Duration::from_secs(window_secs)
            },
        }
    }
}

// ============================================================================
// Session accounting
// ============================================================================

/// Settings for per-identifier session accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionLimitConfig {
    /// Maximum concurrent sessions per identifier; 0 disables accounting.
    pub max_sessions: usize,
    /// Admit over-limit sessions and only log them.
    pub log_only: bool,
}

impl SessionLimitConfig {
    /// Load configuration from environment variables.
    ///
    /// Negative values for `MAX_CONNECTIONS_PER_USER` clamp to 0 (disabled).
    pub fn from_env() -> Self {
        let max_sessions = match std::env::var("MAX_CONNECTIONS_PER_USER") {
            Ok(val) => match val.trim().parse::<i64>() {
                Ok(n) => usize::try_from(n.max(0)).unwrap_or(usize::MAX),
                Err(_) => {
                    warn!(
                        env_var = "MAX_CONNECTIONS_PER_USER",
                        value = %val,
                        default = DEFAULT_MAX_SESSIONS_PER_USER,
                        "Invalid value for environment variable, using default"
                    );
                    DEFAULT_MAX_SESSIONS_PER_USER
                }
            },
            Err(_) => DEFAULT_MAX_SESSIONS_PER_USER,
        };

        Self {
            max_sessions,
            log_only: parse_bool_env("CONNECTION_LIMIT_LOG_ONLY", false),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Read an environment variable, treating unset and non-UTF-8 as absent.
fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Parse an environment variable with a warning on invalid values.
pub(crate) fn parse_env_warn<T: std::str::FromStr + std::fmt::Display>(
    name: &str,
    default: T,
) -> T {
    match std::env::var(name) {
        Ok(val) => match val.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = name,
                    value = %val,
                    default = %default,
                    "Invalid value for environment variable, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a boolean flag (`true`/`1`, case-insensitive).
fn parse_bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().eq_ignore_ascii_case("true") || s.trim() == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Saves and restores env var state around a test.
    struct EnvVarGuard {
        vars: Vec<(&'static str, Option<String>)>,
    }

    impl EnvVarGuard {
        fn new(var_names: &[&'static str]) -> Self {
            let vars = var_names
                .iter()
                .map(|&name| (name, std::env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            for (name, original) in &self.vars {
                // SAFETY: tests touching the environment run under #[serial]
                unsafe {
                    match original {
                        Some(val) => std::env::set_var(name, val),
                        None => std::env::remove_var(name),
                    }
                }
            }
        }
    }

    const MANAGEMENT_VARS: &[&str] = &[
        "XRAY_API_HOST",
        "XRAY_API_PORT",
        "XRAY_INBOUND_TAG",
        "XRAY_ACCOUNT_TYPE_URL",
        "XRAY_HANDLER_SERVICE",
        "XRAY_VLESS_FLOW",
        "XRAY_VLESS_ENCRYPTION",
        "XRAY_READY_TIMEOUT_SECS",
    ];

    fn clear(vars: &[&str]) {
        for var in vars {
            // SAFETY: tests touching the environment run under #[serial]
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn test_loopback_hosts() {
        assert!(is_loopback_host("127.0.0.1"));
        assert!(is_loopback_host("127.0.0.2"));
        assert!(is_loopback_host("localhost"));
        assert!(is_loopback_host(" LOCALHOST "));
        assert!(is_loopback_host("::1"));
        assert!(is_loopback_host("[::1]"));
    }

    #[test]
    fn test_non_loopback_hosts() {
        assert!(!is_loopback_host("203.0.113.5"));
        assert!(!is_loopback_host("0.0.0.0"));
        assert!(!is_loopback_host("10.0.0.1"));
        assert!(!is_loopback_host("xray.internal"));
        assert!(!is_loopback_host(""));
    }

    #[test]
    fn test_management_defaults() {
        let config = ManagementConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 10085);
        assert_eq!(config.inbound_tag, "vless-reality");
        assert_eq!(config.encryption, "none");
        assert!(config.flow.is_empty());
        assert_eq!(config.ready_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_endpoint_uri_brackets_ipv6() {
        assert_eq!(
            ManagementConfig::with_endpoint("::1", 10085).endpoint_uri(),
            "http://[::1]:10085"
        );
        assert_eq!(
            ManagementConfig::with_endpoint("127.0.0.1", 8080).endpoint_uri(),
            "http://127.0.0.1:8080"
        );
        assert_eq!(
            ManagementConfig::with_endpoint("::1", 10085).socket_target(),
            "[::1]:10085"
        );
    }

    #[test]
    #[serial]
    fn test_management_from_env_defaults() {
        let _guard = EnvVarGuard::new(MANAGEMENT_VARS);
        clear(MANAGEMENT_VARS);

        let config = ManagementConfig::from_env().unwrap();
        assert_eq!(config, ManagementConfig::default());
    }

    #[test]
    #[serial]
    fn test_management_from_env_overrides() {
        let _guard = EnvVarGuard::new(MANAGEMENT_VARS);
        clear(MANAGEMENT_VARS);
        // SAFETY: serial test
        unsafe {
            std::env::set_var("XRAY_API_HOST", " localhost ");
            std::env::set_var("XRAY_API_PORT", "10086");
            std::env::set_var("XRAY_INBOUND_TAG", "  vless-in ");
            std::env::set_var("XRAY_VLESS_FLOW", "xtls-rprx-vision");
            std::env::set_var("XRAY_VLESS_ENCRYPTION", "");
            std::env::set_var("XRAY_READY_TIMEOUT_SECS", "5");
        }

        let config = ManagementConfig::from_env().unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 10086);
        assert_eq!(config.inbound_tag, "vless-in");
        assert_eq!(config.flow, "xtls-rprx-vision");
        assert_eq!(config.encryption, "none");
        assert_eq!(config.ready_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_management_from_env_rejects_remote_host() {
        let _guard = EnvVarGuard::new(MANAGEMENT_VARS);
        clear(MANAGEMENT_VARS);
        // SAFETY: serial test
        unsafe { std::env::set_var("XRAY_API_HOST", "203.0.113.5") };

        let result = ManagementConfig::from_env();
        assert!(matches!(result, Err(ConfigError::NonLoopbackHost { .. })));
    }

    #[test]
    #[serial]
    fn test_management_from_env_rejects_blank_tag_and_bad_port() {
        let _guard = EnvVarGuard::new(MANAGEMENT_VARS);
        clear(MANAGEMENT_VARS);
        // SAFETY: serial test
        unsafe { std::env::set_var("XRAY_INBOUND_TAG", "   ") };
        assert!(matches!(
            ManagementConfig::from_env(),
            Err(ConfigError::InvalidValue {
                var: "XRAY_INBOUND_TAG",
                ..
            })
        ));

        clear(MANAGEMENT_VARS);
        // SAFETY: serial test
        unsafe { std::env::set_var("XRAY_API_PORT", "not_a_port") };
        assert!(matches!(
            ManagementConfig::from_env(),
            Err(ConfigError::InvalidValue {
                var: "XRAY_API_PORT",
                ..
            })
        ));
    }

    #[test]
    #[serial]
    fn test_rate_limit_from_env_rejects_zero() {
        let vars = &["RATE_LIMIT_MAX_REQUESTS", "RATE_LIMIT_WINDOW_SECS"];
        let _guard = EnvVarGuard::new(vars);
        // SAFETY: serial test
        unsafe {
            std::env::set_var("RATE_LIMIT_MAX_REQUESTS", "0");
            std::env::set_var("RATE_LIMIT_WINDOW_SECS", "30");
        }

        let config = RateLimitConfig::from_env();
        assert_eq!(config.max_requests, 60);
        assert_eq!(config.window, Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn test_session_limit_from_env() {
        let vars = &["MAX_CONNECTIONS_PER_USER", "CONNECTION_LIMIT_LOG_ONLY"];
        let _guard = EnvVarGuard::new(vars);
        // SAFETY: serial test
        unsafe {
            std::env::set_var("MAX_CONNECTIONS_PER_USER", "-3");
            std::env::set_var("CONNECTION_LIMIT_LOG_ONLY", "TRUE");
        }
        let config = SessionLimitConfig::from_env();
        assert_eq!(config.max_sessions, 0);
        assert!(config.log_only);

        // SAFETY: serial test
        unsafe {
            std::env::set_var("MAX_CONNECTIONS_PER_USER", "2");
            std::env::remove_var("CONNECTION_LIMIT_LOG_ONLY");
        }
        let config = SessionLimitConfig::from_env();
        assert_eq!(config.max_sessions, 2);
        assert!(!config.log_only);
    }
}
