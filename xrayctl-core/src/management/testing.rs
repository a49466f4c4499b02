//! In-memory management service for tests.
//!
//! Behaves like the proxy's handler service for one process: users are
//! keyed by `(tag, email)`, duplicates and missing users are reported the
//! way the proxy reports them (code `Unknown` with a textual detail).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tonic::Status;

use super::transport::{Connector, HandlerConnection};
use crate::error::ManagementError;
use crate::schema::{
    Account, AddUserRequest, AddUserResponse, RemoveUserRequest, RemoveUserResponse, User,
};

#[derive(Default)]
struct ServiceState {
    users: Mutex<HashMap<String, HashMap<String, User>>>,
    reachable: AtomicBool,
    connects: AtomicUsize,
    ready_checks: AtomicUsize,
    next_failure: Mutex<Option<Status>>,
}

/// Shared in-memory handler service. Clones share state.
#[derive(Clone)]
pub struct InMemoryService {
    state: Arc<ServiceState>,
}

impl Default for InMemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryService {
    /// A reachable service with no users.
    pub fn new() -> Self {
        let state = ServiceState::default();
        state.reachable.store(true, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }

    /// Connector handing out connections to this service.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(InMemoryConnector {
            service: self.clone(),
        })
    }

    /// Simulate the proxy going away or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Fail the next call with `status` instead of applying it.
    pub fn fail_next_with(&self, status: Status) {
        *self.state.next_failure.lock() = Some(status);
    }

    /// Number of successful `connect` calls.
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of readiness checks issued against this service.
    pub fn ready_count(&self) -> usize {
        self.state.ready_checks.load(Ordering::SeqCst)
    }

    /// Stored user record, if any.
    pub fn user(&self, tag: &str, email: &str) -> Option<User> {
        self.state
            .users
            .lock()
            .get(tag)
            .and_then(|users| users.get(email))
            .cloned()
    }

    /// Emails registered under `tag`.
    pub fn emails(&self, tag: &str) -> HashSet<String> {
        self.state
            .users
            .lock()
            .get(tag)
            .map(|users| users.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Decoded account of a stored user.
    pub fn account(&self, tag: &str, email: &str) -> Option<Account> {
        self.user(tag, email)
            .and_then(|user| user.account)
            .and_then(|any| Account::unpack(&any).ok())
    }

    fn take_failure(&self) -> Option<Status> {
        self.state.next_failure.lock().take()
    }

    fn check_reachable(&self) -> Result<(), Status> {
        if self.state.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Status::unavailable("connection refused"))
        }
    }
}

struct InMemoryConnector {
    service: InMemoryService,
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn HandlerConnection>, ManagementError> {
        if !self.service.state.reachable.load(Ordering::SeqCst) {
            return Err(ManagementError::Unavailable(
                "connect failed: connection refused".to_string(),
            ));
        }
        self.service.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InMemoryConnection {
            service: self.service.clone(),
        }))
    }
}

struct InMemoryConnection {
    service: InMemoryService,
}

#[async_trait]
impl HandlerConnection for InMemoryConnection {
    async fn ready(&self) -> Result<(), ManagementError> {
        self.service.state.ready_checks.fetch_add(1, Ordering::SeqCst);
        self.service
            .check_reachable()
            .map_err(|status| ManagementError::Unavailable(status.message().to_string()))
    }

    async fn add_user(&self, request: AddUserRequest) -> Result<AddUserResponse, Status> {
        self.service.check_reachable()?;
        if let Some(status) = self.service.take_failure() {
            return Err(status);
        }
        let user = request
            .user
            .ok_or_else(|| Status::invalid_argument("user is required"))?;

        let mut users = self.service.state.users.lock();
        let inbound = users.entry(request.tag).or_default();
        if inbound.contains_key(&user.email) {
            return Err(Status::unknown(format!(
                "failed to add user > User {} already exists.",
                user.email
            )));
        }
        inbound.insert(user.email.clone(), user);
        Ok(AddUserResponse {})
    }

    async fn remove_user(
        &self,
        request: RemoveUserRequest,
    ) -> Result<RemoveUserResponse, Status> {
        self.service.check_reachable()?;
        if let Some(status) = self.service.take_failure() {
            return Err(status);
        }

        let mut users = self.service.state.users.lock();
        let removed = users
            .get_mut(&request.tag)
            .and_then(|inbound| inbound.remove(&request.email));
        match removed {
            Some(_) => Ok(RemoveUserResponse {}),
            None => Err(Status::unknown(format!(
                "failed to remove user > User {} not found.",
                request.email
            ))),
        }
    }
}
