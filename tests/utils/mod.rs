use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::Receiver;

use cardpeek::broadcast::{ChannelBroadcaster, Delivery};
use cardpeek::cards::provider::CardProvider;
use cardpeek::cards::{Card, CardFilter};
use cardpeek::game::GameService;
use cardpeek::lobby::models::GameConfig;
use cardpeek::lobby::registry::LobbyRegistry;
use cardpeek::recorder::{GameRecord, SessionRecorder};
use cardpeek::shared::AppError;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

/// Card provider that returns the catalog in fixed order, so tests know
/// which card each round plays.
pub struct OrderedProvider {
    catalog: Vec<Card>,
}

#[async_trait]
impl CardProvider for OrderedProvider {
    async fn fetch_candidates(
        &self,
        _filter: &CardFilter,
        count: usize,
    ) -> Result<Vec<Card>, AppError> {
        Ok(self.catalog.iter().take(count).cloned().collect())
    }
}

/// Recorder that captures every hand-off for assertions.
#[derive(Default)]
pub struct CapturingRecorder {
    games: Mutex<Vec<(String, Vec<GameRecord>)>>,
}

impl CapturingRecorder {
    pub fn recorded(&self) -> Vec<(String, Vec<GameRecord>)> {
        self.games.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionRecorder for CapturingRecorder {
    async fn record_game(&self, lobby_id: &str, records: Vec<GameRecord>) {
        self.games
            .lock()
            .unwrap()
            .push((lobby_id.to_string(), records));
    }
}

pub struct TestSetup {
    pub service: Arc<GameService>,
    pub registry: Arc<LobbyRegistry>,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub recorder: Arc<CapturingRecorder>,
    pub lobby_id: String,
    pub host: String,
    pub deliveries: Receiver<Delivery>,
}

pub struct TestSetupBuilder {
    players: Vec<String>,
    cards: Vec<Card>,
    round_count: u32,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            players: vec!["alice".to_string()],
            cards: Vec::new(),
            round_count: 1,
        }
    }

    pub fn with_players(mut self, players: Vec<&str>) -> Self {
        self.players = players.into_iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_cards(mut self, cards: Vec<Card>) -> Self {
        self.cards = cards;
        self
    }

    pub fn with_round_count(mut self, round_count: u32) -> Self {
        self.round_count = round_count;
        self
    }

    pub async fn build(self) -> TestSetup {
        let registry = Arc::new(LobbyRegistry::new());
        let broadcaster = Arc::new(ChannelBroadcaster::new());
        let recorder = Arc::new(CapturingRecorder::default());
        let provider = Arc::new(OrderedProvider {
            catalog: self.cards,
        });

        let service = GameService::new(
            Arc::clone(&registry),
            provider,
            broadcaster.clone(),
            recorder.clone(),
        );

        let host = self.players[0].clone();
        let lobby = service
            .create_lobby(
                Some(host.clone()),
                host.clone(),
                false,
                GameConfig {
                    round_count: self.round_count,
                    set_filter: vec!["all".to_string()],
                    rare_only: false,
                    rarity_filter: None,
                },
            )
            .await
            .expect("lobby creation failed");

        for player in &self.players[1..] {
            service
                .join_lobby(&lobby.id, Some(player.clone()), player.clone(), false)
                .await
                .expect("join failed");
        }

        let deliveries = broadcaster.subscribe(&lobby.id).await;

        TestSetup {
            service,
            registry,
            broadcaster,
            recorder,
            lobby_id: lobby.id,
            host,
            deliveries,
        }
    }
}

impl TestSetup {
    /// Drains every delivery currently queued on the lobby channel.
    pub fn drain_deliveries(&mut self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        while let Ok(delivery) = self.deliveries.try_recv() {
            deliveries.push(delivery);
        }
        deliveries
    }
}

pub fn card(id: &str, name: &str, set: &str) -> Card {
    Card {
        id: id.to_string(),
        display_name: name.to_string(),
        full_image_ref: format!("https://img.example/{}/high.png", id),
        set_name: set.to_string(),
        rarity_label: "Rare".to_string(),
        partial_reveal: format!("crop-{}", id),
    }
}

/// Lets spawned tasks (timer fires, recorder hand-offs) run to
/// completion under the paused clock.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
