//! The live set of sessions for one server.
//!
//! The registry is owned by the server and handed to every session it
//! creates, so sessions can enumerate their peers. Membership tracks open
//! transports exactly: a session is inserted when its connection is accepted
//! and removed by the connection task once the transport closes.

use super::{
    principal::{DisplayNamePrincipal, PrincipalPolicy},
    session::{Outbound, Session},
    ConnectionId,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::info;

use crate::config::DEFAULT_OUTBOUND_QUEUE_CAPACITY;

/// Central registry of all live sessions.
///
/// * Uses `RwLock<HashMap>` for the session table
/// * Generates connection IDs from an atomic counter
/// * Owns the principal policy that decides broadcast exclusion
/// * Sizes each session's outbound queue
#[derive(Debug)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<ConnectionId, Arc<Session>>>,
    next_id: AtomicUsize,
    principal_policy: Arc<dyn PrincipalPolicy>,
    outbound_capacity: usize,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry comparing participants by display name.
    pub fn new() -> Self {
        Self::with_policy(Arc::new(DisplayNamePrincipal))
    }

    pub fn with_policy(principal_policy: Arc<dyn PrincipalPolicy>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            principal_policy,
            outbound_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        }
    }

    /// Sets how many frames each new session may have queued for its writer.
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        // mpsc::channel panics on zero
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Creates a session for a newly accepted connection and adds it to the
    /// live set.
    ///
    /// Returns the session together with the receiving end of its outbound
    /// queue, which the connection's writer drains. Connection ids increase
    /// with creation order.
    pub async fn create_session(
        self: &Arc<Self>,
        remote_addr: SocketAddr,
    ) -> (Arc<Session>, mpsc::Receiver<Outbound>) {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.outbound_capacity);
        let session = Arc::new(Session::new(connection_id, remote_addr, Arc::clone(self), sender));

        self.sessions
            .write()
            .await
            .insert(connection_id, Arc::clone(&session));
        info!("🔗 Connection {} from {}", connection_id, remote_addr);

        (session, receiver)
    }

    /// Removes a session from the live set.
    ///
    /// Idempotent; removing an unknown ID does nothing.
    pub async fn remove_session(&self, connection_id: ConnectionId) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(&connection_id);
        if let Some(session) = &removed {
            let lifetime = session.connected_at().elapsed().unwrap_or_default();
            info!(
                "❌ Connection {} from {} disconnected after {:.1}s",
                connection_id,
                session.remote_addr(),
                lifetime.as_secs_f64()
            );
        }
        removed
    }

    pub async fn contains(&self, connection_id: ConnectionId) -> bool {
        self.sessions.read().await.contains_key(&connection_id)
    }

    pub async fn get(&self, connection_id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&connection_id).cloned()
    }

    /// Snapshot of every live session.
    ///
    /// The lock is released before returning, so callers may await on the
    /// sessions without blocking connects and disconnects.
    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub fn same_principal(&self, a: Option<&str>, b: Option<&str>) -> bool {
        self.principal_policy.same_principal(a, b)
    }

    /// Live sessions that are the same principal as `display_name`.
    pub async fn sessions_of(&self, display_name: Option<&str>) -> Vec<Arc<Session>> {
        let mut matching = Vec::new();
        for session in self.sessions().await {
            let name = session.display_name().await;
            if self.same_principal(name.as_deref(), display_name) {
                matching.push(session);
            }
        }
        matching
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Identity;

    fn addr() -> SocketAddr {
        "127.0.0.1:12345".parse().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_remove_sessions() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (first, _rx1) = registry.create_session(addr()).await;
        let (second, _rx2) = registry.create_session(addr()).await;

        assert!(first.id() < second.id());
        assert!(first.connected_at() <= std::time::SystemTime::now());
        assert_eq!(registry.len().await, 2);
        assert!(registry.contains(first.id()).await);
        assert_eq!(registry.get(second.id()).await.map(|s| s.id()), Some(second.id()));

        assert!(registry.remove_session(first.id()).await.is_some());
        assert!(registry.remove_session(first.id()).await.is_none());
        assert!(!registry.contains(first.id()).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_removed_session_no_longer_receives_broadcasts() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (alice, _alice_rx) = registry.create_session(addr()).await;
        let (bob, _bob_rx) = registry.create_session(addr()).await;
        alice.bind_identity(Identity::named("alice")).await;
        bob.bind_identity(Identity::named("bob")).await;

        assert_eq!(alice.peers().await.len(), 1);
        registry.remove_session(bob.id()).await;
        assert!(alice.peers().await.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_of_counts_same_principal() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (a1, _r1) = registry.create_session(addr()).await;
        let (a2, _r2) = registry.create_session(addr()).await;
        let (b, _r3) = registry.create_session(addr()).await;
        a1.bind_identity(Identity::named("alice")).await;
        a2.bind_identity(Identity::named("alice")).await;
        b.bind_identity(Identity::named("bob")).await;

        assert_eq!(registry.sessions_of(Some("alice")).await.len(), 2);
        assert_eq!(registry.sessions_of(Some("bob")).await.len(), 1);
        assert!(registry.sessions_of(Some("carol")).await.is_empty());
    }

    #[derive(Debug)]
    struct EveryoneIsDistinct;

    impl PrincipalPolicy for EveryoneIsDistinct {
        fn same_principal(&self, _a: Option<&str>, _b: Option<&str>) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_custom_policy_changes_peer_set() {
        let registry = Arc::new(ConnectionRegistry::with_policy(Arc::new(EveryoneIsDistinct)));
        let (a1, _r1) = registry.create_session(addr()).await;
        let (a2, _r2) = registry.create_session(addr()).await;
        a1.bind_identity(Identity::named("alice")).await;
        a2.bind_identity(Identity::named("alice")).await;

        // Same display name, but the policy treats them as different people
        assert_eq!(a1.peers().await.len(), 1);
        // A session is never its own peer
        assert!(a1.peers().await.iter().all(|peer| peer.id() != a1.id()));
    }
}
