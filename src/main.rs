use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cardpeek::broadcast::ChannelBroadcaster;
use cardpeek::cards::provider::StaticCardProvider;
use cardpeek::cards::Card;
use cardpeek::lobby::{
    self,
    cleanup_task::{start_cleanup_task, CleanupConfig},
    registry::LobbyRegistry,
};
use cardpeek::recorder::LoggingRecorder;
use cardpeek::shared::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardpeek=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting card guessing game server");

    // TODO: replace the bundled catalog with the remote TCG catalog
    // client once its image pipeline produces partial reveals.
    let card_provider = Arc::new(StaticCardProvider::new(bundled_catalog()));
    let registry = Arc::new(LobbyRegistry::new());
    let broadcaster = Arc::new(ChannelBroadcaster::new());
    let recorder = Arc::new(LoggingRecorder);

    let app_state = AppState::new(registry, card_provider, broadcaster, recorder);

    tokio::spawn(start_cleanup_task(
        Arc::clone(&app_state.registry),
        Arc::clone(&app_state.game_service),
        CleanupConfig::default(),
    ));

    let app = Router::new()
        .route("/", get(|| async { "cardpeek" }))
        .route("/lobby", post(lobby::create_lobby))
        .route("/lobby/:id", get(lobby::lobby_status))
        .route("/lobby/:id/join", post(lobby::join_lobby))
        .route("/lobby/:id/start", post(lobby::start_game))
        .route("/lobby/:id/guess", post(lobby::make_guess))
        .route("/lobby/:id/give-up", post(lobby::give_up))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    info!("Server running on http://localhost:3000");
    axum::serve(listener, app).await.unwrap();
}

/// Small built-in catalog so the server is playable out of the box.
fn bundled_catalog() -> Vec<Card> {
    let entries = [
        ("base1-58", "Pikachu", "base1", "Common"),
        ("base1-4", "Dracaufeu", "base1", "Rare Holo"),
        ("base1-15", "Tortank", "base1", "Rare Holo"),
        ("base1-2", "Florizarre", "base1", "Rare Holo"),
        ("basep-24", "Pikachu Surfeur", "basep", "Promo"),
        ("neo1-11", "Évoli", "neo1", "Rare"),
        ("sv03.5-151", "Mew", "sv03.5", "Illustration rare"),
        ("sv03.5-25", "Pikachu", "sv03.5", "Illustration rare"),
    ];

    entries
        .iter()
        .map(|(id, name, set, rarity)| Card {
            id: id.to_string(),
            display_name: name.to_string(),
            full_image_ref: format!("https://assets.tcgdex.net/fr/{}/{}/high.png", set, id),
            set_name: set.to_string(),
            rarity_label: rarity.to_string(),
            partial_reveal: format!("https://assets.tcgdex.net/fr/{}/{}/low.png", set, id),
        })
        .collect()
}
