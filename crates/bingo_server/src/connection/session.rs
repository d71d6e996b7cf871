//! Server-side state for one live connection.
//!
//! A [`Session`] owns its operation table, its identity slot, its bingo card
//! and the sending half of its outbound queue. Everything a handler needs to
//! answer a client or reach its peers goes through here.

use super::{registry::ConnectionRegistry, ConnectionId};
use crate::{
    error::{OperationError, SessionError},
    game::Card,
    messaging::{encode_frame, OperationHandler, Payload, TypedOperationHandler},
};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{
    broadcast,
    mpsc::{self, error::TrySendError},
    Mutex, RwLock,
};
use tracing::{debug, error, trace, warn};

/// A user record as resolved by the user directory.
///
/// Records from older stores spell the name `DisplayName`; both spellings
/// are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "displayName", alias = "DisplayName")]
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Identity {
    /// An identity carrying only a display name.
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            id: None,
        }
    }
}

/// Items queued for the connection's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A serialized text frame
    Text(String),
    /// Ask the writer to send a close frame and stop
    Close(Option<String>),
}

/// Signals raised on a session over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// First identity bind completed
    Initialized,
    /// An inbound frame could not be turned into an operation call,
    /// or its handler failed
    DeserializationError { reason: String },
    /// The transport closed
    Closed,
}

/// Result of [`Session::bind_identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// This was the session's first bind
    Initialized,
    /// The session already had an identity; it was replaced without
    /// re-initializing
    Rebound,
}

const SESSION_EVENT_CAPACITY: usize = 64;

/// One physical connection and its protocol state.
pub struct Session {
    id: ConnectionId,
    remote_addr: SocketAddr,
    connected_at: SystemTime,
    registry: Arc<ConnectionRegistry>,
    handlers: DashMap<String, Arc<dyn OperationHandler>>,
    identity: RwLock<Option<Identity>>,
    card: Mutex<Option<Card>>,
    outbound: mpsc::Sender<Outbound>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let operations: Vec<String> = self.handlers.iter().map(|h| h.key().clone()).collect();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("operations", &operations)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        registry: Arc<ConnectionRegistry>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            id,
            remote_addr,
            connected_at: SystemTime::now(),
            registry,
            handlers: DashMap::new(),
            identity: RwLock::new(None),
            card: Mutex::new(None),
            outbound,
            events,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Registers a handler object under `name`.
    ///
    /// Fails with [`SessionError::DuplicateOperation`] if `name` already has
    /// a handler; the existing handler is kept. Fails with
    /// [`SessionError::Closed`] once the connection's writer is gone.
    pub fn register_handler(
        &self,
        name: &str,
        handler: Arc<dyn OperationHandler>,
    ) -> Result<(), SessionError> {
        if self.outbound.is_closed() {
            return Err(SessionError::Closed);
        }

        match self.handlers.entry(name.to_string()) {
            Entry::Occupied(_) => Err(SessionError::DuplicateOperation(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                debug!("🔧 Registered operation '{}' on connection {}", name, self.id);
                Ok(())
            }
        }
    }

    /// Registers a closure handling `name`, deserializing its payload into `T`.
    pub fn register_operation<T, F, Fut>(&self, name: &str, handler: F) -> Result<(), SessionError>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(Arc<Session>, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        self.register_handler(name, Arc::new(TypedOperationHandler::new(name, handler)))
    }

    pub fn has_operation(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Invokes the handler registered for `operation`.
    ///
    /// Returns `Ok(false)` when nothing is registered under that name, and
    /// `Ok(true)` once the handler has run to completion. Handler errors are
    /// passed through to the caller.
    pub async fn dispatch(
        self: &Arc<Self>,
        operation: &str,
        payload: Payload,
    ) -> Result<bool, OperationError> {
        let handler = match self.handlers.get(operation) {
            Some(handler) => Arc::clone(handler.value()),
            None => return Ok(false),
        };

        trace!(handler = handler.handler_name(), "Dispatching operation '{}'", operation);
        handler.handle(Arc::clone(self), payload).await?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Binds `identity` to this session.
    ///
    /// Only the first bind raises [`SessionEvent::Initialized`]; later binds
    /// swap the identity and report [`BindOutcome::Rebound`].
    pub async fn bind_identity(&self, identity: Identity) -> BindOutcome {
        let outcome = {
            let mut slot = self.identity.write().await;
            let outcome = if slot.is_none() {
                BindOutcome::Initialized
            } else {
                BindOutcome::Rebound
            };
            *slot = Some(identity);
            outcome
        };

        if outcome == BindOutcome::Initialized {
            self.emit(SessionEvent::Initialized);
        }
        outcome
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.identity.read().await.clone()
    }

    pub async fn display_name(&self) -> Option<String> {
        self.identity
            .read()
            .await
            .as_ref()
            .map(|identity| identity.display_name.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.identity.read().await.is_some()
    }

    // ------------------------------------------------------------------
    // Game state
    // ------------------------------------------------------------------

    pub async fn set_card(&self, card: Card) {
        *self.card.lock().await = Some(card);
    }

    /// Snapshot of the card, if one has been dealt.
    pub async fn card(&self) -> Option<Card> {
        self.card.lock().await.clone()
    }

    /// Runs `f` against the card under the session's card lock.
    ///
    /// Returns `None` when no card has been dealt yet.
    pub async fn with_card_mut<R>(&self, f: impl FnOnce(&mut Card) -> R) -> Option<R> {
        self.card.lock().await.as_mut().map(f)
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    /// Queues `{ event, ...payload }` for this session's client.
    ///
    /// Best-effort: a session whose writer is gone drops the frame.
    pub fn send<P: Serialize + ?Sized>(&self, event: &str, payload: &P) {
        match encode_frame(event, payload) {
            Ok(text) => self.send_raw(Outbound::Text(text)),
            Err(e) => error!("Failed to encode '{}' for connection {}: {}", event, self.id, e),
        }
    }

    /// Queues an already-built item for the writer.
    ///
    /// Never waits: a frame that finds the queue full is dropped. A close
    /// request that finds it full is handed to a task that waits for room,
    /// so it still reaches the writer after the frames ahead of it.
    pub fn send_raw(&self, item: Outbound) {
        match self.outbound.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                debug!("📭 Dropping frame for closed connection {}", self.id);
            }
            Err(TrySendError::Full(Outbound::Close(reason))) => {
                let outbound = self.outbound.clone();
                match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => {
                        runtime.spawn(async move {
                            let _ = outbound.send(Outbound::Close(reason)).await;
                        });
                    }
                    Err(_) => warn!("Cannot queue close for connection {} outside a runtime", self.id),
                }
            }
            Err(TrySendError::Full(Outbound::Text(_))) => {
                warn!("🐢 Outbound queue full for connection {}, dropping frame", self.id);
            }
        }
    }

    /// Sends `{ event, ...payload }` to every peer.
    ///
    /// The frame is encoded once and the live set is read once at call time.
    /// Returns the number of peers the frame was queued for.
    pub async fn broadcast<P: Serialize + ?Sized>(&self, event: &str, payload: &P) -> usize {
        let text = match encode_frame(event, payload) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode broadcast '{}' from connection {}: {}", event, self.id, e);
                return 0;
            }
        };

        let peers = self.peers().await;
        for peer in &peers {
            peer.send_raw(Outbound::Text(text.clone()));
        }

        debug!("📡 Broadcast '{}' from connection {} to {} peer(s)", event, self.id, peers.len());
        peers.len()
    }

    /// Every live session that is not the same principal as this one.
    pub async fn peers(&self) -> Vec<Arc<Session>> {
        let own_name = self.display_name().await;
        let mut peers = Vec::new();
        for session in self.registry.sessions().await {
            if session.id == self.id {
                continue;
            }
            let peer_name = session.display_name().await;
            if !self
                .registry
                .same_principal(own_name.as_deref(), peer_name.as_deref())
            {
                peers.push(session);
            }
        }
        peers
    }

    /// Asks the writer to close the transport.
    pub fn close(&self, reason: Option<String>) {
        self.send_raw(Outbound::Close(reason));
    }

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::NoPayload;
    use serde_json::json;

    async fn new_session(registry: &Arc<ConnectionRegistry>) -> (Arc<Session>, mpsc::Receiver<Outbound>) {
        registry.create_session("127.0.0.1:40000".parse().unwrap()).await
    }

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Text(text) = item {
                frames.push(serde_json::from_str(&text).unwrap());
            }
        }
        frames
    }

    #[tokio::test]
    async fn test_duplicate_registration_fails() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (session, _rx) = new_session(&registry).await;

        session
            .register_operation("ping_op", |_s, _p: NoPayload| async { Ok(()) })
            .expect("first registration succeeds");
        let existing = session.handlers.get("ping_op").map(|h| h.handler_name().to_string());
        assert_eq!(existing.as_deref(), Some("ping_op"));

        let err = session
            .register_operation("ping_op", |_s, _p: NoPayload| async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, SessionError::DuplicateOperation(name) if name == "ping_op"));
    }

    #[tokio::test]
    async fn test_registration_after_writer_gone_fails() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (session, rx) = new_session(&registry).await;
        drop(rx);

        let err = session
            .register_operation("late", |_s, _p: NoPayload| async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, SessionError::Closed));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_operation_returns_false() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (session, _rx) = new_session(&registry).await;

        let handled = session.dispatch("nope", Payload::new()).await.unwrap();
        assert!(!handled);
    }

    #[tokio::test]
    async fn test_dispatch_awaits_handler_and_propagates_errors() {
        #[derive(serde::Deserialize)]
        struct Echo {
            text: String,
        }

        let registry = Arc::new(ConnectionRegistry::new());
        let (session, mut rx) = new_session(&registry).await;
        session
            .register_operation("echo", |session: Arc<Session>, req: Echo| async move {
                tokio::task::yield_now().await;
                session.send("echoed", &json!({ "text": req.text }));
                Ok(())
            })
            .unwrap();

        let mut payload = Payload::new();
        payload.insert("text".into(), json!("hi"));
        assert!(session.dispatch("echo", payload).await.unwrap());
        assert_eq!(drain(&mut rx), vec![json!({ "event": "echoed", "text": "hi" })]);

        // Wrong payload shape surfaces as an error instead of being swallowed
        let err = session.dispatch("echo", Payload::new()).await.unwrap_err();
        assert!(matches!(err, OperationError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_first_bind_initializes_once() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (session, _rx) = new_session(&registry).await;
        let mut events = session.subscribe();

        assert_eq!(session.bind_identity(Identity::named("alice")).await, BindOutcome::Initialized);
        assert_eq!(session.bind_identity(Identity::named("alice2")).await, BindOutcome::Rebound);
        assert_eq!(session.display_name().await.as_deref(), Some("alice2"));

        assert_eq!(events.try_recv().unwrap(), SessionEvent::Initialized);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_skips_same_principal() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (alice, mut alice_rx) = new_session(&registry).await;
        let (alice_tab, mut alice_tab_rx) = new_session(&registry).await;
        let (bob, mut bob_rx) = new_session(&registry).await;
        let (_spectator, mut spectator_rx) = new_session(&registry).await;

        alice.bind_identity(Identity::named("alice")).await;
        alice_tab.bind_identity(Identity::named("alice")).await;
        bob.bind_identity(Identity::named("bob")).await;

        let delivered = alice.broadcast("hello", &json!({ "from": "alice" })).await;
        assert_eq!(delivered, 2);

        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut alice_tab_rx).is_empty());
        assert_eq!(drain(&mut bob_rx), vec![json!({ "event": "hello", "from": "alice" })]);
        assert_eq!(drain(&mut spectator_rx).len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_tolerates_closed_peer() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (alice, _alice_rx) = new_session(&registry).await;
        let (bob, bob_rx) = new_session(&registry).await;
        alice.bind_identity(Identity::named("alice")).await;
        bob.bind_identity(Identity::named("bob")).await;

        // Bob's writer is gone but he is still in the live set
        drop(bob_rx);
        assert_eq!(alice.broadcast("hello", &json!({})).await, 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_frames_but_still_closes() {
        let registry = Arc::new(ConnectionRegistry::new().with_outbound_capacity(2));
        let (alice, _alice_rx) = new_session(&registry).await;
        let (bob, mut bob_rx) = new_session(&registry).await;
        alice.bind_identity(Identity::named("alice")).await;
        bob.bind_identity(Identity::named("bob")).await;

        // Bob's writer is stalled: only the first two frames fit
        for n in 0..5 {
            alice.broadcast("tick", &json!({ "n": n })).await;
        }
        bob.close(Some("bye".to_string()));

        assert_eq!(
            drain(&mut bob_rx),
            vec![json!({ "event": "tick", "n": 0 }), json!({ "event": "tick", "n": 1 })]
        );

        let next = tokio::time::timeout(std::time::Duration::from_secs(1), bob_rx.recv())
            .await
            .expect("close arrives once there is room");
        assert_eq!(next, Some(Outbound::Close(Some("bye".to_string()))));
    }

    #[tokio::test]
    async fn test_identity_accepts_legacy_field_name() {
        let identity: Identity = serde_json::from_value(json!({ "DisplayName": "Zed" })).unwrap();
        assert_eq!(identity.display_name, "Zed");
        assert_eq!(serde_json::to_value(&identity).unwrap(), json!({ "displayName": "Zed" }));
    }
}
