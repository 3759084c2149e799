// Public API - what other modules can use
pub use bus::{ChannelBroadcaster, Delivery, RoomBroadcaster};
pub use messages::{
    GameStartedPayload, GuessResultPayload, MessageMeta, MessageType, NextRoundPayload,
    OutboundMessage, PlayerStatus, ProgressiveRevealPayload, RevealPayload, RevealedCard,
    RoundEndReason, RoundFinishedPayload,
};

mod bus;
pub mod messages;
