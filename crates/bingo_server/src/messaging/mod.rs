//! Message handling and routing for client-server communication.
//!
//! This module provides the infrastructure for parsing, routing, and handling
//! frames between clients and their sessions.

pub mod handler;
pub mod router;
pub mod types;

pub use handler::{NoPayload, OperationHandler, TypedOperationHandler};
pub use router::{route_client_message, RouteOutcome};
pub use types::{encode_frame, FrameError, InboundFrame, Payload, KEEP_ALIVE, KEEP_ALIVE_ACK};
