//! Error types and handling for the bingo server.
//!
//! This module defines the error types that can occur during server and
//! session operations, providing clear categorization of different failure modes.
//! Clients never receive these as structured frames; they are logged, and a
//! handler failure terminates the offending connection.

/// Enumeration of possible server errors.
///
/// Categorizes errors into network-related and internal server errors
/// to help with debugging and error handling.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server errors such as a failed session setup
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by a [`Session`](crate::Session) itself.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An operation name already has a handler on this session.
    ///
    /// Registration happens during connection setup and handshake; hitting
    /// this is a programming error, never a client mistake.
    #[error("Operation '{0}' is already registered on this session")]
    DuplicateOperation(String),

    /// The session's transport is gone.
    #[error("Session is closed")]
    Closed,
}

/// Failures of the identity chain behind the `auth` operation.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The credential could not be decoded or its signature did not verify
    #[error("Invalid credential: {0}")]
    InvalidCredential(#[from] jsonwebtoken::errors::Error),

    /// The decoded token does not map to any known user
    #[error("Unknown user for token")]
    UnknownUser,

    /// The user directory could not be consulted
    #[error("User lookup failed: {0}")]
    Lookup(String),
}

/// Failures while publishing an outbound notification.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The notification could not be encoded for the sink
    #[error("Failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    /// The sink did not accept the notification
    #[error("Notification sink unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by operation handlers during dispatch.
///
/// These propagate out of [`Session::dispatch`](crate::Session::dispatch)
/// untouched; the connection task is responsible for turning them into a
/// terminated transport.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The payload did not match the shape the operation expects
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Notification(#[from] NotificationError),
}
