//! xrayctl core: management-channel client and admission primitives.
//!
//! This library provides the pieces the HTTP control API (`xrayctl-api`)
//! builds on:
//!
//! - [`schema`]: hand-assembled wire schemas for the proxy's handler
//!   service and the process-wide catalog they are registered in
//! - [`management`]: the persistent, loopback-only management client
//!   (`add_user`, `remove_user`, `check_health`)
//! - [`limits`]: sliding-window request throttling and per-user session
//!   accounting
//! - [`config`] and [`error`]: settings and the error taxonomy

pub mod config;
pub mod error;
pub mod limits;
pub mod management;
pub mod schema;

pub use error::{ManagementError, ManagementResult};
pub use management::{ConnectionState, ManagementClient};
