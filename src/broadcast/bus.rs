use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::messages::OutboundMessage;

/// One delivery on a lobby's push channel.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// `None` means every member of the lobby; `Some(id)` means only that
    /// player's connection.
    pub target: Option<String>,
    pub message: OutboundMessage,
}

/// The transport boundary the engine pushes through.
///
/// The real-time channel itself is out of scope; the engine only needs
/// "deliver to everyone in lobby X" and "deliver to one player".
#[async_trait]
pub trait RoomBroadcaster {
    async fn broadcast(&self, lobby_id: &str, message: OutboundMessage);
    async fn send_to_player(&self, lobby_id: &str, player_id: &str, message: OutboundMessage);
}

/// In-process broadcaster over per-lobby tokio broadcast channels.
///
/// A transport adapter (or test) subscribes per lobby and forwards
/// deliveries to actual connections.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Delivery>>>>,
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBroadcaster {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn sender(&self, lobby_id: &str) -> broadcast::Sender<Delivery> {
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(lobby_id) {
                return sender.clone();
            }
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(lobby_id.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }

    /// Subscribe to all deliveries for a lobby.
    pub async fn subscribe(&self, lobby_id: &str) -> broadcast::Receiver<Delivery> {
        self.sender(lobby_id).await.subscribe()
    }

    /// Drops a lobby's channel; subscribers see the stream close.
    pub async fn close_lobby(&self, lobby_id: &str) {
        let mut channels = self.channels.write().await;
        channels.remove(lobby_id);
    }

    async fn deliver(&self, lobby_id: &str, delivery: Delivery) {
        let sender = self.sender(lobby_id).await;
        match sender.send(delivery) {
            Ok(receivers) => {
                debug!(lobby_id = %lobby_id, receivers = receivers, "Delivery sent")
            }
            Err(_) => {
                debug!(lobby_id = %lobby_id, "Delivery sent with no receivers")
            }
        }
    }
}

#[async_trait]
impl RoomBroadcaster for ChannelBroadcaster {
    async fn broadcast(&self, lobby_id: &str, message: OutboundMessage) {
        self.deliver(
            lobby_id,
            Delivery {
                target: None,
                message,
            },
        )
        .await;
    }

    async fn send_to_player(&self, lobby_id: &str, player_id: &str, message: OutboundMessage) {
        self.deliver(
            lobby_id,
            Delivery {
                target: Some(player_id.to_string()),
                message,
            },
        )
        .await;
    }
}
