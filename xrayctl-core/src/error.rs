//! Error taxonomy for the management channel.
//!
//! Benign remote outcomes ("already exists", "not found") are not errors;
//! they fold into the boolean results of `add_user` / `remove_user`.
//! Everything here propagates to the caller, which owns the decision of how
//! to surface it (the HTTP layer maps all three kinds to 503).

use thiserror::Error;

/// Errors produced by the management client.
#[derive(Error, Debug)]
pub enum ManagementError {
    /// Invalid endpoint or binding configuration. Fatal at construction,
    /// never retried.
    #[error("Invalid management configuration: {0}")]
    Configuration(String),

    /// The connection could not be established or did not become ready
    /// within the readiness timeout. Callers may retry later.
    #[error("Management interface unavailable: {0}")]
    Unavailable(String),

    /// The remote acknowledged the call with an error that is not one of the
    /// benign set-semantics outcomes.
    #[error("Management call failed ({code:?}): {details}")]
    Remote {
        /// gRPC status code returned by the proxy.
        code: tonic::Code,
        /// Remote detail text, or the rendered status when the detail is empty.
        details: String,
    },
}

impl ManagementError {
    /// Build a `Remote` error from a gRPC status, keeping the remote detail text.
    pub fn from_status(status: &tonic::Status) -> Self {
        let details = if status.message().is_empty() {
            status.to_string()
        } else {
            status.message().to_string()
        };
        Self::Remote {
            code: status.code(),
            details,
        }
    }

    /// Whether retrying the triggering operation later may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type alias for management operations.
pub type ManagementResult<T> = Result<T, ManagementError>;
