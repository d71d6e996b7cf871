//! Built-in handshake operations.
//!
//! Every fresh session gets `auth` (and, when enabled, `fakeAuth`) before
//! anything else. The first successful bind welcomes the client, announces
//! it to its peers and hands the session to the [`SessionInitializer`] that
//! registers the game operations.

use super::SessionInitializer;
use crate::{
    config::DuplicateSessionPolicy,
    connection::{BindOutcome, Identity, Session},
    error::{AuthError, OperationError, SessionError},
    services::{CredentialVerifier, UserDirectory},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const AUTH_OPERATION: &str = "auth";
pub const FAKE_AUTH_OPERATION: &str = "fakeAuth";

pub const LOGGED_IN_EVENT: &str = "loggedIn";
pub const USER_LOG_IN_EVENT: &str = "userLogIn";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthRequest {
    #[serde(default, alias = "jwt")]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FakeAuthRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
struct UserEvent<'a> {
    user: &'a str,
}

/// The handshake operations and the one-time initialization they trigger.
pub struct Handshake {
    verifier: Arc<dyn CredentialVerifier>,
    directory: Arc<dyn UserDirectory>,
    initializer: Arc<dyn SessionInitializer>,
    duplicate_sessions: DuplicateSessionPolicy,
    allow_fake_auth: bool,
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("duplicate_sessions", &self.duplicate_sessions)
            .field("allow_fake_auth", &self.allow_fake_auth)
            .finish_non_exhaustive()
    }
}

impl Handshake {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        directory: Arc<dyn UserDirectory>,
        initializer: Arc<dyn SessionInitializer>,
    ) -> Self {
        Self {
            verifier,
            directory,
            initializer,
            duplicate_sessions: DuplicateSessionPolicy::default(),
            allow_fake_auth: false,
        }
    }

    pub fn with_duplicate_sessions(mut self, policy: DuplicateSessionPolicy) -> Self {
        self.duplicate_sessions = policy;
        self
    }

    /// Offers the unverified `fakeAuth` operation. Development only.
    pub fn with_fake_auth(mut self, allow: bool) -> Self {
        self.allow_fake_auth = allow;
        self
    }

    /// Registers the handshake operations on a fresh session.
    pub fn install(self: &Arc<Self>, session: &Session) -> Result<(), SessionError> {
        let handshake = Arc::clone(self);
        session.register_operation(AUTH_OPERATION, move |session, request: AuthRequest| {
            let handshake = Arc::clone(&handshake);
            async move { handshake.authenticate(session, request).await }
        })?;

        if self.allow_fake_auth {
            let handshake = Arc::clone(self);
            session.register_operation(FAKE_AUTH_OPERATION, move |session, request: FakeAuthRequest| {
                let handshake = Arc::clone(&handshake);
                async move { handshake.fake_authenticate(session, request).await }
            })?;
        }

        Ok(())
    }

    /// `auth`: decode the credential, resolve the user, bind.
    ///
    /// A missing credential and any failure in the decode/lookup chain are
    /// logged and leave the session unauthenticated and open.
    async fn authenticate(&self, session: Arc<Session>, request: AuthRequest) -> Result<(), OperationError> {
        let Some(credential) = request.credential.filter(|c| !c.is_empty()) else {
            warn!("Log in attempted without a credential");
            return Ok(());
        };

        info!("User trying to log in with credential...");
        let identity = match self.resolve(&credential).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Error trying to log in with credential: {}", e);
                return Ok(());
            }
        };

        self.bind(session, identity).await
    }

    async fn resolve(&self, credential: &str) -> Result<Identity, AuthError> {
        let claims = self.verifier.decode_credential(credential)?;
        self.directory.lookup_user(&claims.token).await
    }

    /// `fakeAuth`: bind the given name without verification.
    async fn fake_authenticate(&self, session: Arc<Session>, request: FakeAuthRequest) -> Result<(), OperationError> {
        info!(name = %request.name, "User trying to log in...");
        self.bind(session, Identity::named(request.name)).await
    }

    async fn bind(&self, session: Arc<Session>, identity: Identity) -> Result<(), OperationError> {
        match session.bind_identity(identity).await {
            BindOutcome::Initialized => self.initialize(session).await,
            BindOutcome::Rebound => {
                info!("Session re-authenticated; keeping existing game state");
                Ok(())
            }
        }
    }

    /// One-time setup after a session's first bind.
    ///
    /// Age is decided by connection id, so two sessions of one user that
    /// bind before either gets here still agree on which one is newer.
    async fn initialize(&self, session: Arc<Session>) -> Result<(), OperationError> {
        let name = session.display_name().await.unwrap_or_default();
        tracing::Span::current().record("user", name.as_str());

        let older: Vec<_> = session
            .registry()
            .sessions_of(Some(&name))
            .await
            .into_iter()
            .filter(|other| other.id() < session.id())
            .collect();

        if !older.is_empty() {
            match self.duplicate_sessions {
                DuplicateSessionPolicy::Coexist => {
                    info!("User connected but they are already connected");
                }
                DuplicateSessionPolicy::RejectNew => {
                    warn!("User connected but they are already connected; closing new session");
                    session.close(Some("You are already connected".to_string()));
                    return Ok(());
                }
                DuplicateSessionPolicy::ReplaceExisting => {
                    warn!(count = older.len(), "User connected but they are already connected; closing older session(s)");
                    for previous in &older {
                        previous.close(Some("Connected from another location".to_string()));
                    }
                }
            }
        }

        session.send(LOGGED_IN_EVENT, &UserEvent { user: &name });
        session.broadcast(USER_LOG_IN_EVENT, &UserEvent { user: &name }).await;

        self.initializer.on_initialized(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionRegistry, Outbound};
    use crate::services::{InMemoryUserDirectory, JwtCredentialVerifier};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    #[derive(Debug)]
    struct NoGame;

    #[async_trait]
    impl SessionInitializer for NoGame {
        async fn on_initialized(&self, _session: Arc<Session>) -> Result<(), OperationError> {
            Ok(())
        }
    }

    fn handshake(policy: DuplicateSessionPolicy) -> Handshake {
        Handshake::new(
            Arc::new(JwtCredentialVerifier::new(b"secret")),
            Arc::new(InMemoryUserDirectory::new()),
            Arc::new(NoGame),
        )
        .with_duplicate_sessions(policy)
    }

    fn closes(rx: &mut mpsc::Receiver<Outbound>) -> usize {
        let mut count = 0;
        while let Ok(item) = rx.try_recv() {
            if matches!(item, Outbound::Close(_)) {
                count += 1;
            }
        }
        count
    }

    /// Both sessions of "alice" are bound before either runs its setup.
    async fn bound_pair(
        registry: &Arc<ConnectionRegistry>,
    ) -> ((Arc<Session>, mpsc::Receiver<Outbound>), (Arc<Session>, mpsc::Receiver<Outbound>)) {
        let older = registry.create_session("127.0.0.1:41000".parse().unwrap()).await;
        let newer = registry.create_session("127.0.0.1:41001".parse().unwrap()).await;
        older.0.bind_identity(Identity::named("alice")).await;
        newer.0.bind_identity(Identity::named("alice")).await;
        (older, newer)
    }

    #[tokio::test]
    async fn test_replace_existing_with_overlapping_binds_keeps_newest() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handshake = handshake(DuplicateSessionPolicy::ReplaceExisting);
        let ((older, mut older_rx), (newer, mut newer_rx)) = bound_pair(&registry).await;

        handshake.initialize(Arc::clone(&older)).await.unwrap();
        handshake.initialize(Arc::clone(&newer)).await.unwrap();

        assert_eq!(closes(&mut older_rx), 1);
        assert_eq!(closes(&mut newer_rx), 0);
    }

    #[tokio::test]
    async fn test_reject_new_with_overlapping_binds_keeps_oldest() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handshake = handshake(DuplicateSessionPolicy::RejectNew);
        let ((older, mut older_rx), (newer, mut newer_rx)) = bound_pair(&registry).await;

        handshake.initialize(Arc::clone(&older)).await.unwrap();
        handshake.initialize(Arc::clone(&newer)).await.unwrap();

        assert_eq!(closes(&mut older_rx), 0);
        assert_eq!(closes(&mut newer_rx), 1);
    }

    #[tokio::test]
    async fn test_initialization_order_does_not_matter() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handshake = handshake(DuplicateSessionPolicy::ReplaceExisting);
        let ((older, mut older_rx), (newer, mut newer_rx)) = bound_pair(&registry).await;

        handshake.initialize(Arc::clone(&newer)).await.unwrap();
        handshake.initialize(Arc::clone(&older)).await.unwrap();

        assert_eq!(closes(&mut older_rx), 1);
        assert_eq!(closes(&mut newer_rx), 0);
    }
}
