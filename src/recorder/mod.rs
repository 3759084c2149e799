use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

use crate::game::scoring::ROUND_DURATION_MS;
use crate::lobby::models::{Lobby, RoundOutcome};

/// Finalized per-player history handed to the persistence boundary when
/// a lobby reaches FINISHED. A pure projection of the lobby's history
/// and scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub player_id: String,
    pub display_name: String,
    pub final_score: u32,
    /// Theoretical ceiling: full round budget times configured rounds.
    pub max_possible_score: u64,
    /// Outcomes in round order; rounds the player never entered (joined
    /// late, lobby short on cards) simply have no entry.
    pub outcomes: Vec<RoundOutcome>,
    pub cards_correct: u32,
    pub fastest_correct_millis: Option<u64>,
    /// Distinct card sets the player saw across their rounds, sorted.
    pub distinct_sets: Vec<String>,
}

/// Boundary to the external statistics store. The engine only produces
/// the records; delivery is best-effort and must never block a lobby.
#[async_trait]
pub trait SessionRecorder {
    async fn record_game(&self, lobby_id: &str, records: Vec<GameRecord>);
}

/// Default recorder: logs the hand-off and drops it. Stands in for the
/// real statistics service in development and tests.
pub struct LoggingRecorder;

#[async_trait]
impl SessionRecorder for LoggingRecorder {
    async fn record_game(&self, lobby_id: &str, records: Vec<GameRecord>) {
        for record in &records {
            info!(
                lobby_id = %lobby_id,
                player_id = %record.player_id,
                final_score = record.final_score,
                cards_correct = record.cards_correct,
                "Recorded game session"
            );
        }
    }
}

/// Builds one record per non-guest player from a finished lobby.
pub fn build_records(lobby: &Lobby) -> Vec<GameRecord> {
    let max_possible_score = ROUND_DURATION_MS * u64::from(lobby.config.round_count);

    lobby
        .players()
        .iter()
        .filter(|p| !p.guest)
        .map(|player| {
            let mut outcomes: Vec<RoundOutcome> = Vec::new();
            let mut distinct_sets: BTreeSet<String> = BTreeSet::new();

            for (round, round_outcomes) in lobby.history() {
                let Some(outcome) = round_outcomes.iter().find(|o| o.player_id == player.id)
                else {
                    continue;
                };
                if let Some(card) = lobby.cards().get(*round as usize - 1) {
                    distinct_sets.insert(card.set_name.clone());
                }
                outcomes.push(outcome.clone());
            }

            let cards_correct = outcomes.iter().filter(|o| o.correct).count() as u32;
            let fastest_correct_millis = outcomes
                .iter()
                .filter(|o| o.correct)
                .map(|o| o.elapsed_millis)
                .min();

            GameRecord {
                player_id: player.id.clone(),
                display_name: player.display_name.clone(),
                final_score: lobby.scores().get(&player.id).copied().unwrap_or(0),
                max_possible_score,
                outcomes,
                cards_correct,
                fastest_correct_millis,
                distinct_sets: distinct_sets.into_iter().collect(),
            }
        })
        .collect()
}
