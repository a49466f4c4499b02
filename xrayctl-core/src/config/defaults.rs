//! Centralized default values.

use std::time::Duration;

/// Default management host. The management port must never leave the box.
pub const DEFAULT_MANAGEMENT_HOST: &str = "127.0.0.1";

/// Default port of the proxy's gRPC API inbound.
pub const DEFAULT_MANAGEMENT_PORT: u16 = 10085;

/// Default inbound listener whose users are administered.
pub const DEFAULT_INBOUND_TAG: &str = "vless-reality";

/// Type URL stamped on the packed account payload.
pub const DEFAULT_ACCOUNT_TYPE_URL: &str = "type.googleapis.com/xray.proxy.vless.Account";

/// Fully-qualified name of the management service.
pub const DEFAULT_HANDLER_SERVICE: &str = "xray.app.proxyman.command.HandlerService";

/// Account encryption when none is configured.
pub const DEFAULT_ENCRYPTION: &str = "none";

/// Bounded wait for connection establishment and readiness.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Requests admitted per identity per window.
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: usize = 60;

/// Trailing window for the request rate limiter.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Concurrent sessions per identifier (0 disables accounting).
pub const DEFAULT_MAX_SESSIONS_PER_USER: usize = 0;
