//! Client for the proxy's user-management service.
//!
//! ## Connection States
//!
//! ```text
//! Disconnected → Connecting → Ready
//!       ↑                       │
//!       └──── failure / close ──┘
//! ```
//!
//! The client owns one persistent connection. `start` and `close` are
//! serialized; RPC callers share the ready connection without locking.
//!
//! ## Set semantics
//!
//! `add_user` and `remove_user` return the resulting *state*, not whether
//! this particular call changed anything: adding an existing user returns
//! `Ok(false)`, removing a missing one returns `Ok(false)`. The control
//! plane may retry after an ambiguous failure (connection dropped mid-call)
//! and a retry must not turn into an error. Do not "fix" these into hard
//! errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use arc_swap::ArcSwapOption;
use tonic::{Code, Status};
use tracing::debug;

use crate::config::{ManagementConfig, is_loopback_host};
use crate::error::{ManagementError, ManagementResult};
use crate::schema::{self, Account, AddUserRequest, RemoveUserRequest, User};

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod transport;

pub use transport::{Connector, GrpcConnector, HandlerConnection};

// ============================================================================
// Connection State
// ============================================================================

/// Connection state of the management client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection held. Initial state, and the state after failure or close.
    Disconnected,
    /// `start` is establishing the connection.
    Connecting,
    /// Connected and ready for calls.
    Ready,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Ready,
            _ => Self::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Ready => 2,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

// ============================================================================
// Outcome classification
// ============================================================================

/// Remote said the user is already present.
fn is_already_exists(status: &Status) -> bool {
    status.code() == Code::AlreadyExists || status.message().to_lowercase().contains("exist")
}

/// Remote said the user is absent.
fn is_not_found(status: &Status) -> bool {
    matches!(status.code(), Code::NotFound | Code::FailedPrecondition)
        || status.message().to_lowercase().contains("not found")
}

// ============================================================================
// Client
// ============================================================================

/// Management client bound to one inbound tag.
pub struct ManagementClient {
    config: ManagementConfig,
    connector: Arc<dyn Connector>,
    connection: ArcSwapOption<Arc<dyn HandlerConnection>>,
    state: AtomicU8,
    lifecycle: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for ManagementClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementClient")
            .field("endpoint", &self.config.endpoint_uri())
            .field("inbound_tag", &self.config.inbound_tag)
            .field("state", &self.state())
            .finish()
    }
}

impl ManagementClient {
    /// Create a client that talks gRPC to the configured endpoint.
    ///
    /// No connection is attempted here.
    ///
    /// # Errors
    ///
    /// Returns `ManagementError::Configuration` if the host is not loopback
    /// or the endpoint cannot be parsed.
    pub fn new(config: ManagementConfig) -> ManagementResult<Self> {
        validate_endpoint(&config)?;
        let connector = Arc::new(GrpcConnector::new(&config)?);
        Self::with_connector(config, connector)
    }

    /// Create a client over a custom connector.
    ///
    /// The loopback rule still applies, so tests cannot accidentally build a
    /// client that would be rejected in production.
    pub fn with_connector(
        mut config: ManagementConfig,
        connector: Arc<dyn Connector>,
    ) -> ManagementResult<Self> {
        validate_endpoint(&config)?;

        let catalog = schema::ensure_registered();
        for name in schema::management_type_names() {
            catalog.require(&name)?;
        }

        if config.encryption.is_empty() {
            config.encryption = crate::config::DEFAULT_ENCRYPTION.to_string();
        }

        Ok(Self {
            config,
            connector,
            connection: ArcSwapOption::empty(),
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ManagementConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Establish the connection if not already held.
    ///
    /// Waits at most `ready_timeout` for connect plus readiness. A second
    /// call while ready is a no-op.
    ///
    /// # Errors
    ///
    /// `ManagementError::Unavailable` on timeout or transport rejection; the
    /// client is left `Disconnected`.
    pub async fn start(&self) -> ManagementResult<()> {
        let _guard = self.lifecycle.lock().await;
        if self.connection.load().is_some() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        let attempt = async {
            let connection = self.connector.connect().await?;
            connection.ready().await?;
            Ok::<_, ManagementError>(connection)
        };

        match tokio::time::timeout(self.config.ready_timeout, attempt).await {
            Ok(Ok(connection)) => {
                self.connection.store(Some(Arc::new(connection)));
                self.set_state(ConnectionState::Ready);
                debug!(endpoint = %self.config.endpoint_uri(), "Management client ready");
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                Err(ManagementError::Unavailable(format!(
                    "timed out after {:?} connecting to {}",
                    self.config.ready_timeout,
                    self.config.endpoint_uri()
                )))
            }
        }
    }

    /// Release the connection. Idempotent.
    pub async fn close(&self) {
        let _guard = self.lifecycle.lock().await;
        if self.connection.swap(None).is_some() {
            debug!("Management connection closed");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Return a ready connection, starting or re-validating as needed.
    async fn ensure_ready(&self) -> ManagementResult<Arc<dyn HandlerConnection>> {
        if self.connection.load().is_none() {
            // `start` already waited for readiness.
            self.start().await?;
            return self
                .connection
                .load_full()
                .map(|connection| Arc::clone(&*connection))
                .ok_or_else(|| {
                    ManagementError::Unavailable("management connection closed".to_string())
                });
        }

        let Some(connection) = self.connection.load_full() else {
            return Err(ManagementError::Unavailable(
                "management connection closed".to_string(),
            ));
        };
        let connection = Arc::clone(&*connection);

        let readiness = tokio::time::timeout(self.config.ready_timeout, connection.ready()).await;
        let failure = match readiness {
            Ok(Ok(())) => return Ok(connection),
            Ok(Err(e)) => e,
            Err(_) => ManagementError::Unavailable(format!(
                "timed out after {:?} waiting for readiness",
                self.config.ready_timeout
            )),
        };

        self.drop_connection(&connection).await;
        Err(failure)
    }

    /// Forget `failed` if it is still the held connection.
    async fn drop_connection(&self, failed: &Arc<dyn HandlerConnection>) {
        let _guard = self.lifecycle.lock().await;
        let still_current = self
            .connection
            .load()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(&**current, failed));
        if still_current {
            self.connection.store(None);
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Build the user record for an identifier.
    ///
    /// The identifier is both the user key (`email`) and the account id.
    pub fn build_user(&self, identifier: &str) -> User {
        let account = Account {
            id: identifier.to_string(),
            flow: self.config.flow.clone(),
            encryption: self.config.encryption.clone(),
        };

        User {
            email: identifier.to_string(),
            level: 0,
            alter_id: 0,
            account: Some(account.pack(&self.config.account_type_url)),
        }
    }

    /// Ensure the user exists on the configured inbound.
    ///
    /// Returns `Ok(true)` if the proxy acknowledged the add, `Ok(false)` if
    /// the user was already present. Both mean "the user exists now".
    ///
    /// # Errors
    ///
    /// - `Unavailable` if the connection cannot be made ready
    /// - `Remote` for any other remote failure, with the remote detail text
    pub async fn add_user(&self, identifier: &str) -> ManagementResult<bool> {
        let connection = self.ensure_ready().await?;
        let request = AddUserRequest {
            tag: self.config.inbound_tag.clone(),
            user: Some(self.build_user(identifier)),
        };

        match connection.add_user(request).await {
            Ok(_) => Ok(true),
            Err(status) if is_already_exists(&status) => Ok(false),
            Err(status) => Err(ManagementError::from_status(&status)),
        }
    }

    /// Ensure the user is absent from the configured inbound.
    ///
    /// Returns `Ok(true)` if the proxy acknowledged the removal, `Ok(false)`
    /// if the user was not there. Both mean "the user is gone now".
    ///
    /// # Errors
    ///
    /// - `Unavailable` if the connection cannot be made ready
    /// - `Remote` for any other remote failure, with the remote detail text
    pub async fn remove_user(&self, identifier: &str) -> ManagementResult<bool> {
        let connection = self.ensure_ready().await?;
        let request = RemoveUserRequest {
            tag: self.config.inbound_tag.clone(),
            email: identifier.to_string(),
        };

        match connection.remove_user(request).await {
            Ok(_) => Ok(true),
            Err(status) if is_not_found(&status) => Ok(false),
            Err(status) => Err(ManagementError::from_status(&status)),
        }
    }

    /// Whether the management connection is ready. Never errors.
    pub async fn check_health(&self) -> bool {
        self.ensure_ready().await.is_ok()
    }
}

fn validate_endpoint(config: &ManagementConfig) -> ManagementResult<()> {
    if is_loopback_host(&config.host) {
        Ok(())
    } else {
        Err(ManagementError::Configuration(format!(
            "management host '{}' is not a loopback address",
            config.host
        )))
    }
}
