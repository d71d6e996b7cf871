//! Factory functions for servers wired with the in-process collaborators.

use crate::{
    config::ServerConfig,
    server::BingoServer,
    services::{
        InMemoryUserDirectory, JwtCredentialVerifier, LogNotificationSink, ServerServices,
        UserRecord,
    },
};
use std::sync::Arc;

/// Collaborators backed by a JWT secret, a fixed user list and the log sink.
pub fn local_services(
    jwt_secret: &[u8],
    users: impl IntoIterator<Item = UserRecord>,
) -> ServerServices {
    ServerServices::new(
        Arc::new(JwtCredentialVerifier::new(jwt_secret)),
        Arc::new(InMemoryUserDirectory::from_records(users)),
        Arc::new(LogNotificationSink),
    )
}

/// Creates a server with the given configuration and local collaborators.
///
/// # Example
///
/// ```rust
/// use bingo_server::{create_server_with_config, ServerConfig};
///
/// let config = ServerConfig {
///     bind_address: "0.0.0.0:9000".parse().unwrap(),
///     max_connections: 50,
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config, b"secret", Vec::new());
/// assert_eq!(server.config().max_connections, 50);
/// ```
pub fn create_server_with_config(
    config: ServerConfig,
    jwt_secret: &[u8],
    users: impl IntoIterator<Item = UserRecord>,
) -> BingoServer {
    BingoServer::new(config, local_services(jwt_secret, users))
}
