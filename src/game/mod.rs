mod scheduler;
pub mod scoring;
pub mod service;

pub use scoring::{evaluate_guess, MatchKind, REVEAL_TICK_MS, ROUND_DURATION_MS};
pub use service::GameService;
