//! External collaborators the server depends on.
//!
//! Identity verification, user lookup and notification delivery live outside
//! the session core; each is reached through a trait so deployments and
//! tests can plug in their own implementation.

pub mod credentials;
pub mod directory;
pub mod notification;

pub use credentials::{CredentialClaims, CredentialVerifier, JwtCredentialVerifier};
pub use directory::{InMemoryUserDirectory, UserDirectory, UserRecord};
pub use notification::{
    ChannelNotificationSink, DiscardNotificationSink, LogNotificationSink, NotificationMessage, NotificationSink,
};

use std::sync::Arc;

/// The full set of collaborators handed to a server.
#[derive(Clone)]
pub struct ServerServices {
    pub verifier: Arc<dyn CredentialVerifier>,
    pub directory: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl ServerServices {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            verifier,
            directory,
            notifier,
        }
    }
}

impl std::fmt::Debug for ServerServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerServices").finish_non_exhaustive()
    }
}
