//! # Bingo Server
//!
//! A WebSocket server for a multiplayer bingo game. Every connected client
//! gets a [`Session`](connection::Session); once it logs in it is dealt a
//! deterministic 4x4 card and can mark cells, watch the other players' cards
//! and declare a bingo.
//!
//! ## Message Flow
//!
//! 1. Client sends a text frame `{ "op": "<operation>", ...payload }`
//! 2. The frame is parsed and dispatched to the session's handler for `op`
//! 3. Handlers reply with `{ "event": "<event>", ...payload }` to the caller,
//!    or broadcast it to every peer that is not the same participant
//!
//! The literal text `ping` is answered with `pong` and never parsed.
//!
//! ## Operations
//!
//! | Operation         | Available           | Effect                                       |
//! |-------------------|---------------------|----------------------------------------------|
//! | `auth`            | always              | verify credential, look up user, log in      |
//! | `fakeAuth`        | when enabled        | log in under any name, unverified            |
//! | `getUsers`        | after login         | `connectedUsers` with every peer's card      |
//! | `getCardState`    | after login         | `cardStateUpdate` with the caller's card     |
//! | `updateCardState` | after login         | mark a cell, broadcast `cardStateUpdate`     |
//! | `declareBingo`    | after login         | notify externally, broadcast `bingoWinner`   |
//!
//! ## Collaborators
//!
//! Credential verification, user lookup and notifications are reached through
//! the traits in [`services`]; [`utils::local_services`] wires the in-process
//! defaults.
//!
//! ## Error Handling
//!
//! Clients never receive error frames. Malformed frames and unknown
//! operations are logged and ignored; a failing handler closes the connection.

pub use auth::{Handshake, SessionInitializer};
pub use config::{DuplicateSessionPolicy, ServerConfig};
pub use connection::{ConnectionRegistry, Identity, Session, SessionEvent};
pub use error::{AuthError, NotificationError, OperationError, ServerError, SessionError};
pub use game::{BingoOperations, Card, Cell, GameConfig, SeedConfig};
pub use server::BingoServer;
pub use shutdown::ShutdownState;
pub use utils::{create_server_with_config, local_services};

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod messaging;
pub mod server;
pub mod services;
pub mod shutdown;
pub mod utils;
