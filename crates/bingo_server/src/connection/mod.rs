//! Connection management for client sessions.
//!
//! This module handles the lifecycle of client sessions, including the live
//! session registry, identity binding, and outbound delivery.

pub mod principal;
pub mod registry;
pub mod session;

pub use principal::{DisplayNamePrincipal, PrincipalPolicy};
pub use registry::ConnectionRegistry;
pub use session::{BindOutcome, Identity, Outbound, Session, SessionEvent};

/// Type alias for connection identifiers.
///
/// Connection IDs are used to uniquely identify client connections
/// throughout their lifecycle on the server.
pub type ConnectionId = usize;
