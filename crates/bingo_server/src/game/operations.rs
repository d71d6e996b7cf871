//! Game operations registered on a session once it has an identity.
//!
//! Every participant's card is visible to every other participant; peers
//! watching each other's boards is part of the game.

use super::card::{Card, GameConfig};
use crate::{
    auth::SessionInitializer,
    connection::Session,
    error::OperationError,
    messaging::NoPayload,
    services::{NotificationMessage, NotificationSink},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

pub const GET_USERS_OPERATION: &str = "getUsers";
pub const GET_CARD_STATE_OPERATION: &str = "getCardState";
pub const UPDATE_CARD_STATE_OPERATION: &str = "updateCardState";
pub const DECLARE_BINGO_OPERATION: &str = "declareBingo";

pub const CONNECTED_USERS_EVENT: &str = "connectedUsers";
pub const CARD_STATE_UPDATE_EVENT: &str = "cardStateUpdate";
pub const BINGO_WINNER_EVENT: &str = "bingoWinner";

/// `updateCardState` request.
///
/// Indices are taken loosely: any non-negative whole number counts, including
/// `1.0`; strings, fractions and negatives are out of range.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCardRequest {
    #[serde(default)]
    pub col: Value,
    #[serde(default)]
    pub row: Value,
    #[serde(default)]
    pub is_checked: bool,
}

/// `declareBingo` request. `cells` is relayed verbatim.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeclareBingoRequest {
    #[serde(default)]
    pub cells: Value,
}

#[derive(Debug, Serialize)]
pub struct UserCard {
    pub user: String,
    pub card: Option<Card>,
}

#[derive(Debug, Serialize)]
struct ConnectedUsers {
    users: Vec<UserCard>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CardStateUpdate<'a> {
    user: &'a str,
    bingo_card: &'a Card,
}

#[derive(Debug, Serialize)]
struct BingoWinner<'a> {
    user: &'a str,
    cells: &'a Value,
}

/// Deals cards and registers the game operations on initialized sessions.
///
/// Cloning is cheap; each registered operation holds its own clone.
#[derive(Clone)]
pub struct BingoOperations {
    config: Arc<GameConfig>,
    notifier: Arc<dyn NotificationSink>,
    notification_channel: Arc<str>,
    broadcast_invalid_updates: bool,
}

impl std::fmt::Debug for BingoOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BingoOperations")
            .field("notification_channel", &self.notification_channel)
            .field("broadcast_invalid_updates", &self.broadcast_invalid_updates)
            .finish_non_exhaustive()
    }
}

impl BingoOperations {
    pub fn new(
        config: GameConfig,
        notifier: Arc<dyn NotificationSink>,
        notification_channel: impl Into<String>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            notifier,
            notification_channel: Arc::from(notification_channel.into()),
            broadcast_invalid_updates: true,
        }
    }

    /// Whether an out-of-range update still broadcasts the unchanged card.
    pub fn with_broadcast_invalid_updates(mut self, enabled: bool) -> Self {
        self.broadcast_invalid_updates = enabled;
        self
    }

    /// `getUsers`: every peer's name and card.
    ///
    /// Peers that have not logged in yet have neither and are left out.
    async fn list_users(session: Arc<Session>) -> Result<(), OperationError> {
        let mut users = Vec::new();
        for peer in session.peers().await {
            if let Some(user) = peer.display_name().await {
                users.push(UserCard {
                    user,
                    card: peer.card().await,
                });
            }
        }

        session.send(CONNECTED_USERS_EVENT, &ConnectedUsers { users });
        Ok(())
    }

    /// `getCardState`: the caller's own card.
    async fn card_state(session: Arc<Session>) -> Result<(), OperationError> {
        let user = session.display_name().await.unwrap_or_default();
        if let Some(card) = session.card().await {
            session.send(
                CARD_STATE_UPDATE_EVENT,
                &CardStateUpdate {
                    user: &user,
                    bingo_card: &card,
                },
            );
        }
        Ok(())
    }

    /// `updateCardState`: set one cell's checked flag, then show peers the card.
    async fn update_card(&self, session: Arc<Session>, request: UpdateCardRequest) -> Result<(), OperationError> {
        let target = as_index(&request.col).zip(as_index(&request.row));
        let applied = match target {
            Some((col, row)) => session
                .with_card_mut(|card| card.set_checked(col, row, request.is_checked))
                .await
                .unwrap_or(false),
            None => false,
        };

        if !applied {
            debug!(col = %request.col, row = %request.row, "Ignoring out-of-range card update");
            if !self.broadcast_invalid_updates {
                return Ok(());
            }
        }

        let user = session.display_name().await.unwrap_or_default();
        if let Some(card) = session.card().await {
            session
                .broadcast(
                    CARD_STATE_UPDATE_EVENT,
                    &CardStateUpdate {
                        user: &user,
                        bingo_card: &card,
                    },
                )
                .await;
        }
        Ok(())
    }

    /// `declareBingo`: announce externally, then tell every peer.
    ///
    /// The declared cells are not checked against the card.
    async fn declare_bingo(&self, session: Arc<Session>, request: DeclareBingoRequest) -> Result<(), OperationError> {
        let user = session.display_name().await.unwrap_or_default();
        info!("🎉 {} declared bingo", user);

        let message = NotificationMessage::new(
            self.notification_channel.to_string(),
            format!("{user} GOT A BINGO!!!"),
        );
        if let Err(e) = self.notifier.publish(message).await {
            error!("Failed to publish bingo notification: {}", e);
        }

        session
            .broadcast(
                BINGO_WINNER_EVENT,
                &BingoWinner {
                    user: &user,
                    cells: &request.cells,
                },
            )
            .await;
        Ok(())
    }
}

#[async_trait]
impl SessionInitializer for BingoOperations {
    /// Deals the participant's card and registers the game operations.
    async fn on_initialized(&self, session: Arc<Session>) -> Result<(), OperationError> {
        let name = session.display_name().await.unwrap_or_default();
        session.set_card(Card::generate(&self.config, &name)).await;

        session.register_operation(GET_USERS_OPERATION, |session, _: NoPayload| {
            Self::list_users(session)
        })?;

        session.register_operation(GET_CARD_STATE_OPERATION, |session, _: NoPayload| {
            Self::card_state(session)
        })?;

        let operations = self.clone();
        session.register_operation(UPDATE_CARD_STATE_OPERATION, move |session, request: UpdateCardRequest| {
            let operations = operations.clone();
            async move { operations.update_card(session, request).await }
        })?;

        let operations = self.clone();
        session.register_operation(DECLARE_BINGO_OPERATION, move |session, request: DeclareBingoRequest| {
            let operations = operations.clone();
            async move { operations.declare_bingo(session, request).await }
        })?;

        info!("🃏 Dealt card for {}", name);
        Ok(())
    }
}

fn as_index(value: &Value) -> Option<usize> {
    if let Some(index) = value.as_u64() {
        return usize::try_from(index).ok();
    }

    let float = value.as_f64()?;
    if float >= 0.0 && float.fract() == 0.0 && float <= usize::MAX as f64 {
        Some(float as usize)
    } else {
        None
    }
}
