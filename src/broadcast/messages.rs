use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::lobby::models::RoundOutcome;

/// Message types pushed to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    GameStarted,
    GuessResult,
    ProgressiveReveal,
    RoundFinished,
    NextRound,
    PlayerJoined,
}

/// Metadata attached to every outbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMeta {
    pub timestamp: DateTime<Utc>,
}

/// Envelope handed to the transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    pub meta: MessageMeta,
}

impl OutboundMessage {
    pub fn new<T: Serialize>(message_type: MessageType, payload: &T) -> Self {
        Self {
            message_type,
            // Payloads are plain data structs; serialization cannot fail.
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
            meta: MessageMeta {
                timestamp: Utc::now(),
            },
        }
    }
}

/// Per-player line in status listings, in join order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerStatus {
    pub player_id: String,
    pub display_name: String,
    pub score: u32,
    pub finished_round: bool,
}

/// What clients may render of the hidden card at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevealPayload {
    pub partial_reveal: String,
    /// Elapsed fraction of the round, 0.0..=1.0.
    pub revealed_fraction: f64,
}

/// Card identity disclosed once a player's round is over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevealedCard {
    pub name: String,
    pub full_image_ref: String,
    pub set_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStartedPayload {
    pub round: u32,
    pub total_rounds: u32,
    pub reveal: RevealPayload,
    pub player_statuses: Vec<PlayerStatus>,
}

/// Result of a single guess or give-up, sent to the acting player.
///
/// Card identity is only present on correct guesses and give-ups; a
/// failed guess must not leak the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessResultPayload {
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_image_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_name: Option<String>,
    pub points_awarded: u32,
    pub round_finished: bool,
    pub scores: HashMap<String, u32>,
    pub player_statuses: Vec<PlayerStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressiveRevealPayload {
    pub reveal: RevealPayload,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundEndReason {
    Normal,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundFinishedPayload {
    pub round: u32,
    pub reason: RoundEndReason,
    pub result: RevealedCard,
    pub scores: HashMap<String, u32>,
    pub player_statuses: Vec<PlayerStatus>,
}

/// Payload of the NEXT_ROUND message: either another round opens with the
/// same shape as GAME_STARTED, or the game is over with final standings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextRoundPayload {
    Playing {
        round: u32,
        total_rounds: u32,
        reveal: RevealPayload,
        player_statuses: Vec<PlayerStatus>,
    },
    Finished {
        scores: HashMap<String, u32>,
        history: HashMap<u32, Vec<RoundOutcome>>,
        player_statuses: Vec<PlayerStatus>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerJoinedPayload {
    pub player_id: String,
    pub display_name: String,
    pub player_statuses: Vec<PlayerStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_uses_screaming_snake_case() {
        let json = serde_json::to_string(&MessageType::ProgressiveReveal).unwrap();
        assert_eq!(json, "\"PROGRESSIVE_REVEAL\"");
    }

    #[test]
    fn failed_guess_payload_omits_card_identity() {
        let payload = GuessResultPayload {
            correct: false,
            name: None,
            full_image_ref: None,
            set_name: None,
            points_awarded: 0,
            round_finished: false,
            scores: HashMap::new(),
            player_statuses: Vec::new(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("name").is_none());
        assert!(json.get("full_image_ref").is_none());
        assert!(json.get("set_name").is_none());
    }

    #[test]
    fn next_round_payload_is_tagged_by_status() {
        let payload = NextRoundPayload::Finished {
            scores: HashMap::new(),
            history: HashMap::new(),
            player_statuses: Vec::new(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "FINISHED");
    }

    #[test]
    fn envelope_round_trips() {
        let payload = ProgressiveRevealPayload {
            reveal: RevealPayload {
                partial_reveal: "crop".to_string(),
                revealed_fraction: 0.5,
            },
        };
        let message = OutboundMessage::new(MessageType::ProgressiveReveal, &payload);
        let json = serde_json::to_string(&message).unwrap();
        let back: OutboundMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message_type, MessageType::ProgressiveReveal);
        assert_eq!(back.payload["reveal"]["revealed_fraction"], 0.5);
    }
}
