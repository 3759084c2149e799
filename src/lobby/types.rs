use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::models::{GameConfig, LobbyStatus};
use crate::broadcast::PlayerStatus;

/// Request payload for creating a new lobby.
///
/// `player_id` is optional: absent means an ephemeral guest identity is
/// minted for the caller.
#[derive(Debug, Deserialize)]
pub struct CreateLobbyRequest {
    pub player_id: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub guest: bool,
    pub config: GameConfig,
}

/// Request payload for joining an existing lobby.
#[derive(Debug, Deserialize)]
pub struct JoinLobbyRequest {
    pub player_id: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub guest: bool,
}

/// Request payload for host-only start and for give-up.
#[derive(Debug, Deserialize)]
pub struct PlayerActionRequest {
    pub player_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GuessRequest {
    pub player_id: String,
    pub guess: String,
}

/// Committed lobby snapshot returned by create/join/status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyStatusResponse {
    pub id: String,
    pub host_id: String,
    pub status: LobbyStatus,
    pub current_round: u32,
    pub total_rounds: u32,
    /// In join order.
    pub players: Vec<PlayerStatus>,
    pub scores: HashMap<String, u32>,
}
