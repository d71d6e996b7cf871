//! Session authentication and post-login initialization.

pub mod handshake;

pub use handshake::{AuthRequest, FakeAuthRequest, Handshake};

use crate::{connection::Session, error::OperationError};
use async_trait::async_trait;
use std::sync::Arc;

/// Called once per session, right after its first successful bind and the
/// welcome/presence messages.
///
/// This is where the operations that require an identity get registered.
#[async_trait]
pub trait SessionInitializer: Send + Sync + 'static {
    async fn on_initialized(&self, session: Arc<Session>) -> Result<(), OperationError>;
}
