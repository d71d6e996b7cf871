//! Connection handling logic for WebSocket clients.
//!
//! One task per connection: the WebSocket handshake, registration of a
//! [`Session`], the incoming and outgoing loops, and cleanup once either
//! loop ends.

use crate::{
    auth::Handshake,
    connection::{ConnectionRegistry, Outbound, Session, SessionEvent},
    error::ServerError,
    messaging::route_client_message,
};
use futures::StreamExt;
use futures_util::{sink::SinkExt, stream::SplitSink};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    WebSocketStream,
};
use tracing::{debug, error, info, info_span, trace, Instrument};

type WsSender = Arc<Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>>;

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Perform the WebSocket handshake
/// 2. Register a session and install the handshake operations on it
/// 3. Run the incoming and outgoing loops until either one ends
/// 4. Raise the close signal and remove the session from the registry
///
/// A handler failure ends the incoming loop, which closes the transport.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    handshake: Arc<Handshake>,
    max_message_size: usize,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (session, outbound) = registry.create_session(addr).await;
    let connection_id = session.id();

    if let Err(e) = handshake.install(&session) {
        registry.remove_session(connection_id).await;
        return Err(ServerError::Internal(format!(
            "Failed to install handshake on connection {connection_id}: {e}"
        )));
    }

    let span = info_span!(
        "connection",
        connection_id,
        remote_addr = %addr,
        user = tracing::field::Empty
    );

    run_session(ws_stream, Arc::clone(&session), outbound, max_message_size)
        .instrument(span)
        .await;

    registry.remove_session(connection_id).await;
    Ok(())
}

async fn run_session(
    ws_stream: WebSocketStream<TcpStream>,
    session: Arc<Session>,
    mut outbound: mpsc::Receiver<Outbound>,
    max_message_size: usize,
) {
    info!("🔗 New WebSocket connection");

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(ws_sender));
    let ws_sender_incoming = ws_sender.clone();
    let ws_sender_outgoing = ws_sender.clone();

    // Incoming message task
    let incoming_task = {
        let session = Arc::clone(&session);
        async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        match route_client_message(text.as_str(), &session, max_message_size).await {
                            Ok(outcome) => trace!(?outcome, "Frame routed"),
                            Err(e) => {
                                error!("❌ Operation failed, closing connection: {}", e);
                                session.emit(SessionEvent::DeserializationError {
                                    reason: e.to_string(),
                                });
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("🔌 Client requested close");
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        let mut ws_sender = ws_sender_incoming.lock().await;
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    };

    // Outgoing message task
    let outgoing_task = {
        let ws_sender = ws_sender_outgoing;
        async move {
            while let Some(item) = outbound.recv().await {
                let mut ws_sender = ws_sender.lock().await;
                match item {
                    Outbound::Text(text) => {
                        if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                            error!("Failed to send message: {}", e);
                            break;
                        }
                    }
                    Outbound::Close(reason) => {
                        debug!(?reason, "Server closing connection");
                        let frame = reason.map(|reason| CloseFrame {
                            code: CloseCode::Normal,
                            reason: reason.into(),
                        });
                        let _ = ws_sender.send(Message::Close(frame)).await;
                        break;
                    }
                }
            }
        }
    };

    // Run both tasks concurrently until one completes
    tokio::select! {
        _ = incoming_task => {},
        _ = outgoing_task => {},
    }

    let _ = ws_sender.lock().await.close().await;
    session.emit(SessionEvent::Closed);
    info!("👋 Connection closed");
}
