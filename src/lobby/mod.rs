// Public API - what other modules can use
pub use handlers::{create_lobby, give_up, join_lobby, lobby_status, make_guess, start_game};

// Internal modules
pub mod cleanup_task;
mod handlers;
pub mod models;
pub mod registry;
pub mod types;
