// Library crate for the card-guessing game server
// This file exposes the public API for integration tests

pub mod broadcast;
pub mod cards;
pub mod game;
pub mod lobby;
pub mod recorder;
pub mod shared;

// Re-export commonly used types for easier access in tests
pub use broadcast::{ChannelBroadcaster, MessageType, OutboundMessage, RoomBroadcaster};
pub use game::{GameService, ROUND_DURATION_MS};
pub use lobby::{models::Lobby, registry::LobbyRegistry};
pub use recorder::{GameRecord, LoggingRecorder, SessionRecorder};
pub use shared::AppError;
