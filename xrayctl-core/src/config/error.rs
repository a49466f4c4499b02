//! Configuration error types.

use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set or is blank.
    #[error("environment variable '{var}' not set (required)")]
    MissingEnvVar { var: &'static str },

    /// An environment variable holds a value that cannot be used.
    #[error("invalid value '{value}' for '{var}': {message}")]
    InvalidValue {
        var: &'static str,
        value: String,
        message: String,
    },

    /// The management host does not resolve to a loopback address.
    #[error("management host '{host}' must remain on localhost")]
    NonLoopbackHost { host: String },
}
