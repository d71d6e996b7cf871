//! Core bingo server implementation.
//!
//! This module contains the `BingoServer` struct, which wires the
//! collaborators into a handshake, owns the connection registry and runs the
//! accept loop.

use crate::{
    auth::Handshake,
    config::ServerConfig,
    connection::ConnectionRegistry,
    error::ServerError,
    game::BingoOperations,
    server::handlers::handle_connection,
    services::ServerServices,
    shutdown::ShutdownState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// The bingo server.
///
/// Holds no per-game state of its own: everything lives on the sessions in
/// the registry, so one server can be started, stopped and inspected from
/// tests without touching global state.
pub struct BingoServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Every live session
    registry: Arc<ConnectionRegistry>,

    /// Handshake installed on each new session
    handshake: Arc<Handshake>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl std::fmt::Debug for BingoServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BingoServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BingoServer {
    /// Creates a server with a default registry (display-name principals).
    pub fn new(config: ServerConfig, services: ServerServices) -> Self {
        let registry = ConnectionRegistry::new().with_outbound_capacity(config.outbound_queue_capacity);
        Self::with_registry(config, services, Arc::new(registry))
    }

    /// Creates a server around an existing registry, e.g. one built with a
    /// custom principal policy.
    pub fn with_registry(
        config: ServerConfig,
        services: ServerServices,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        let operations = BingoOperations::new(
            config.game.clone(),
            services.notifier,
            config.notification_channel.clone(),
        )
        .with_broadcast_invalid_updates(config.broadcast_invalid_updates);

        let handshake = Handshake::new(services.verifier, services.directory, Arc::new(operations))
            .with_duplicate_sessions(config.duplicate_sessions)
            .with_fake_auth(config.allow_fake_auth);

        if config.allow_fake_auth {
            warn!("⚠️ fakeAuth is enabled: clients can log in as anyone");
        }

        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            config,
            registry,
            handshake: Arc::new(handshake),
            shutdown_sender,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Binds the configured address and serves until shutdown is requested.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.start_internal(None).await
    }

    /// Like [`start`](Self::start), also stopping once `shutdown_state` is
    /// initiated.
    pub async fn start_with_shutdown_state(&self, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        self.start_internal(Some(shutdown_state)).await
    }

    async fn start_internal(&self, shutdown_state: Option<ShutdownState>) -> Result<(), ServerError> {
        info!("🚀 Starting bingo server on {}", self.config.bind_address);

        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind {}: {e}", self.config.bind_address)))?;

        self.serve(listener, shutdown_state).await
    }

    /// Runs the accept loop on an already bound listener.
    pub async fn serve(&self, listener: TcpListener, shutdown_state: Option<ShutdownState>) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(format!("Listener has no local address: {e}")))?;
        info!("🎮 Accepting connections on {}", local_addr);

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let shutdown_state = shutdown_state.unwrap_or_default();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.admit(stream, addr).await,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        break;
                    }
                },
                _ = shutdown_receiver.recv() => {
                    info!("Internal shutdown signal received");
                    break;
                }
                _ = shutdown_state.wait() => {
                    info!("🛑 Accept loop stopping - shutdown initiated");
                    break;
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    /// Spawns a connection task, or drops the socket when at capacity.
    async fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        let live = self.registry.len().await;
        if live >= self.config.max_connections {
            warn!(
                "🚫 Refusing connection from {}: {} of {} connections in use",
                addr, live, self.config.max_connections
            );
            return;
        }

        debug!("Accepted TCP connection from {}", addr);
        let registry = self.registry.clone();
        let handshake = self.handshake.clone();
        let max_message_size = self.config.max_message_size;

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, registry, handshake, max_message_size).await {
                error!("Connection error: {}", e);
            }
        });
    }

    /// Stops the accept loop. Established connections are left to finish.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        let _ = self.shutdown_sender.send(());
        Ok(())
    }
}
