//! Message routing logic for dispatching client frames to session handlers.
//!
//! This module parses incoming text frames and routes them to the handler
//! the session has registered for the frame's operation.

use super::{InboundFrame, KEEP_ALIVE, KEEP_ALIVE_ACK};
use crate::{
    connection::{Outbound, Session, SessionEvent},
    error::OperationError,
    messaging::FrameError,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What became of one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Keep-alive token answered
    KeepAlive,
    /// Empty frame, nothing to do
    Ignored,
    /// Unparsable frame; the session's deserialization signal was raised
    Malformed,
    /// No handler registered for the operation
    Unhandled(String),
    /// Handler ran to completion
    Dispatched(String),
}

/// Routes one raw text frame from a client.
///
/// # Message Flow
///
/// 1. Answer the keep-alive token directly, bypassing parsing
/// 2. Enforce the frame size limit
/// 3. Parse the frame as `{ op, ...payload }`
/// 4. Dispatch to the session's handler for `op`
///
/// Malformed frames are logged and signalled on the session but are not an
/// error: the connection stays open. Handler failures are returned to the
/// caller untouched.
pub async fn route_client_message(
    text: &str,
    session: &Arc<Session>,
    max_message_size: usize,
) -> Result<RouteOutcome, OperationError> {
    if text == KEEP_ALIVE {
        session.send_raw(Outbound::Text(KEEP_ALIVE_ACK.to_string()));
        return Ok(RouteOutcome::KeepAlive);
    }

    if text.is_empty() {
        return Ok(RouteOutcome::Ignored);
    }

    let frame = if text.len() > max_message_size {
        Err(FrameError::TooLarge {
            size: text.len(),
            limit: max_message_size,
        })
    } else {
        InboundFrame::parse(text)
    };

    let InboundFrame { operation, payload } = match frame {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Deserialization error handling message from connection {}: {}", session.id(), e);
            session.emit(SessionEvent::DeserializationError {
                reason: e.to_string(),
            });
            return Ok(RouteOutcome::Malformed);
        }
    };

    info!(op = %operation, "📨 Received new websocket message");

    if session.dispatch(&operation, payload).await? {
        debug!(op = %operation, "✅ Operation handled");
        Ok(RouteOutcome::Dispatched(operation))
    } else {
        info!(op = %operation, "No registered handler for op");
        Ok(RouteOutcome::Unhandled(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionRegistry;
    use crate::error::SessionError;
    use crate::messaging::NoPayload;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    const LIMIT: usize = 64 * 1024;

    async fn session() -> (Arc<Session>, mpsc::Receiver<Outbound>) {
        let registry = Arc::new(ConnectionRegistry::new());
        registry.create_session("127.0.0.1:9000".parse().unwrap()).await
    }

    #[tokio::test]
    async fn test_keep_alive_only_acknowledges() {
        let (session, mut rx) = session().await;
        let outcome = route_client_message("ping", &session, LIMIT).await.unwrap();

        assert_eq!(outcome, RouteOutcome::KeepAlive);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Text("pong".to_string()));
        assert!(rx.try_recv().is_err());
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_malformed_frames_raise_signal_without_error() {
        let (session, mut rx) = session().await;
        let mut events = session.subscribe();

        for text in ["{broken", r#"{"name":"no op"}"#, "42"] {
            let outcome = route_client_message(text, &session, LIMIT).await.unwrap();
            assert_eq!(outcome, RouteOutcome::Malformed);
            assert!(matches!(
                events.try_recv().unwrap(),
                SessionEvent::DeserializationError { .. }
            ));
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_malformed() {
        let (session, _rx) = session().await;
        let text = format!(r#"{{"op":"x","pad":"{}"}}"#, "a".repeat(100));
        let outcome = route_client_message(&text, &session, 32).await.unwrap();
        assert_eq!(outcome, RouteOutcome::Malformed);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_unhandled() {
        let (session, _rx) = session().await;
        let outcome = route_client_message(r#"{"op":"whatever"}"#, &session, LIMIT)
            .await
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Unhandled("whatever".to_string()));
    }

    #[tokio::test]
    async fn test_dispatches_to_registered_handler() {
        let (session, _rx) = session().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        session
            .register_operation("count", move |_s, _p: NoPayload| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();

        let outcome = route_client_message(r#"{"op":"count","extra":1}"#, &session, LIMIT)
            .await
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Dispatched("count".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_propagates() {
        let (session, _rx) = session().await;
        session
            .register_operation("explode", |_s, _p: NoPayload| async {
                Err(OperationError::Session(SessionError::Closed))
            })
            .unwrap();

        let result = route_client_message(r#"{"op":"explode"}"#, &session, LIMIT).await;
        assert!(matches!(result, Err(OperationError::Session(SessionError::Closed))));
    }
}
