use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, instrument};

use super::types::{
    CreateLobbyRequest, GuessRequest, JoinLobbyRequest, LobbyStatusResponse, PlayerActionRequest,
};
use crate::broadcast::{GameStartedPayload, GuessResultPayload};
use crate::shared::{AppError, AppState};

/// POST /lobby
#[instrument(name = "create_lobby", skip(state, request))]
pub async fn create_lobby(
    State(state): State<AppState>,
    Json(request): Json<CreateLobbyRequest>,
) -> Result<Json<LobbyStatusResponse>, AppError> {
    let lobby = state
        .game_service
        .create_lobby(
            request.player_id,
            request.display_name,
            request.guest,
            request.config,
        )
        .await?;

    info!(lobby_id = %lobby.id, "Lobby created via HTTP");
    Ok(Json(lobby))
}

/// POST /lobby/:id/join
#[instrument(name = "join_lobby", skip(state, request))]
pub async fn join_lobby(
    State(state): State<AppState>,
    Path(lobby_id): Path<String>,
    Json(request): Json<JoinLobbyRequest>,
) -> Result<Json<LobbyStatusResponse>, AppError> {
    let lobby = state
        .game_service
        .join_lobby(
            &lobby_id,
            request.player_id,
            request.display_name,
            request.guest,
        )
        .await?;
    Ok(Json(lobby))
}

/// POST /lobby/:id/start
#[instrument(name = "start_game", skip(state, request))]
pub async fn start_game(
    State(state): State<AppState>,
    Path(lobby_id): Path<String>,
    Json(request): Json<PlayerActionRequest>,
) -> Result<Json<GameStartedPayload>, AppError> {
    let started = state
        .game_service
        .start_game(&lobby_id, &request.player_id)
        .await?;
    Ok(Json(started))
}

/// POST /lobby/:id/guess
#[instrument(name = "make_guess", skip(state, request))]
pub async fn make_guess(
    State(state): State<AppState>,
    Path(lobby_id): Path<String>,
    Json(request): Json<GuessRequest>,
) -> Result<Json<GuessResultPayload>, AppError> {
    let result = state
        .game_service
        .make_guess(&lobby_id, &request.player_id, &request.guess)
        .await?;
    Ok(Json(result))
}

/// POST /lobby/:id/give-up
#[instrument(name = "give_up", skip(state, request))]
pub async fn give_up(
    State(state): State<AppState>,
    Path(lobby_id): Path<String>,
    Json(request): Json<PlayerActionRequest>,
) -> Result<Json<GuessResultPayload>, AppError> {
    let result = state
        .game_service
        .give_up(&lobby_id, &request.player_id)
        .await?;
    Ok(Json(result))
}

/// GET /lobby/:id
#[instrument(name = "lobby_status", skip(state))]
pub async fn lobby_status(
    State(state): State<AppState>,
    Path(lobby_id): Path<String>,
) -> Result<Json<LobbyStatusResponse>, AppError> {
    let lobby = state.game_service.lobby_status(&lobby_id).await?;
    Ok(Json(lobby))
}
