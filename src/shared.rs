use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::broadcast::RoomBroadcaster;
use crate::cards::provider::CardProvider;
use crate::game::service::GameService;
use crate::lobby::registry::LobbyRegistry;
use crate::recorder::SessionRecorder;

/// Shared application state handed to the HTTP handlers. The service
/// owns the provider, broadcaster and recorder; only the registry is
/// also needed directly (by the cleanup task).
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<LobbyRegistry>,
    pub game_service: Arc<GameService>,
}

impl AppState {
    pub fn new(
        registry: Arc<LobbyRegistry>,
        card_provider: Arc<dyn CardProvider + Send + Sync>,
        broadcaster: Arc<dyn RoomBroadcaster + Send + Sync>,
        recorder: Arc<dyn SessionRecorder + Send + Sync>,
    ) -> Self {
        let game_service = GameService::new(
            Arc::clone(&registry),
            card_provider,
            broadcaster,
            recorder,
        );
        Self {
            registry,
            game_service,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Game already started")]
    AlreadyStarted,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Game is not active")]
    GameNotActive,

    #[error("No cards available for this configuration")]
    NoCardsAvailable,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::AlreadyStarted => {
                (StatusCode::CONFLICT, "Game already started".to_string())
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::GameNotActive => {
                (StatusCode::CONFLICT, "Game is not active".to_string())
            }
            AppError::NoCardsAvailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "No cards available for this configuration".to_string(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
