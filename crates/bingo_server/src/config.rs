//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the bingo server behavior.

use crate::game::GameConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Default notification channel for bingo announcements.
pub const DEFAULT_NOTIFICATION_CHANNEL: &str = "259438654890573839";

/// Default number of frames queued per connection before new ones are dropped.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// What to do when a participant initializes a second live session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateSessionPolicy {
    /// Keep both sessions and log the duplicate
    #[default]
    Coexist,
    /// Close the newly initialized session before it is welcomed
    RejectNew,
    /// Close every older session of the same participant
    ReplaceExisting,
}

/// Configuration structure for the bingo server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Maximum inbound text frame size in bytes
    pub max_message_size: usize,

    /// Frames queued per connection before further ones are dropped
    pub outbound_queue_capacity: usize,

    /// Whether the unverified `fakeAuth` operation is offered
    pub allow_fake_auth: bool,

    /// Handling of a second live session for the same participant
    pub duplicate_sessions: DuplicateSessionPolicy,

    /// Whether an out-of-range card update is still broadcast to peers
    pub broadcast_invalid_updates: bool,

    /// Notification channel named in bingo announcements
    pub notification_channel: String,

    /// Card generation settings
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1000,
            max_message_size: 64 * 1024, // 64KB
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            allow_fake_auth: false,
            duplicate_sessions: DuplicateSessionPolicy::Coexist,
            broadcast_invalid_updates: true,
            notification_channel: DEFAULT_NOTIFICATION_CHANNEL.to_string(),
            game: GameConfig::default(),
        }
    }
}
