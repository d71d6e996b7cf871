//! Outbound notifications for announcements such as a declared bingo.
//!
//! Notifications are fire-and-forget: the server publishes once, logs a
//! failure, and carries on.

use crate::error::NotificationError;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A chat message for an external relay to post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Target channel on the relay side
    pub channel: String,
    /// Human-readable text
    pub payload: String,
}

impl NotificationMessage {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// Queue body: the message as JSON, base64 encoded.
    ///
    /// This is not the protobuf `DiscordMessage { channel, payload }` body
    /// that existing Discord relay consumers decode; a consumer of this
    /// queue has to base64-decode and then parse JSON.
    pub fn encode_body(&self) -> Result<String, NotificationError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(general_purpose::STANDARD.encode(bytes))
    }
}

/// Destination for outbound notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn publish(&self, message: NotificationMessage) -> Result<(), NotificationError>;
}

/// Sink that only records the notification in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn publish(&self, message: NotificationMessage) -> Result<(), NotificationError> {
        let body = message.encode_body()?;
        info!(channel = %message.channel, %body, "📣 Notification published: {}", message.payload);
        Ok(())
    }
}

/// Sink for deployments with notifications switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardNotificationSink;

#[async_trait]
impl NotificationSink for DiscardNotificationSink {
    async fn publish(&self, message: NotificationMessage) -> Result<(), NotificationError> {
        debug!(channel = %message.channel, "Notifications disabled, dropping: {}", message.payload);
        Ok(())
    }
}

/// Sink forwarding notifications to an in-process receiver.
#[derive(Debug, Clone)]
pub struct ChannelNotificationSink {
    sender: mpsc::UnboundedSender<NotificationMessage>,
}

impl ChannelNotificationSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationSink for ChannelNotificationSink {
    async fn publish(&self, message: NotificationMessage) -> Result<(), NotificationError> {
        self.sender
            .send(message)
            .map_err(|_| NotificationError::Unavailable("receiver dropped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_round_trips_through_base64() {
        let message = NotificationMessage::new("general", "alice GOT A BINGO!!!");
        let body = message.encode_body().unwrap();
        let decoded = general_purpose::STANDARD.decode(body).unwrap();
        let parsed: NotificationMessage = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(parsed, message);
    }

    #[tokio::test]
    async fn test_channel_sink_reports_dropped_receiver() {
        let (sink, receiver) = ChannelNotificationSink::new();
        drop(receiver);
        let result = sink.publish(NotificationMessage::new("c", "p")).await;
        assert!(matches!(result, Err(NotificationError::Unavailable(_))));
    }
}
