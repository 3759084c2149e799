use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::time::Instant;

use crate::cards::{Card, CardFilter};
use crate::shared::AppError;

/// Immutable game configuration chosen at lobby creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub round_count: u32,
    /// Set ids to draw cards from; "all" disables the restriction.
    pub set_filter: Vec<String>,
    pub rare_only: bool,
    pub rarity_filter: Option<Vec<String>>,
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.round_count == 0 {
            return Err(AppError::BadRequest(
                "Round count must be at least 1".to_string(),
            ));
        }
        if self.set_filter.is_empty() {
            return Err(AppError::BadRequest(
                "Set filter cannot be empty (use \"all\")".to_string(),
            ));
        }
        Ok(())
    }

    pub fn card_filter(&self) -> CardFilter {
        CardFilter {
            sets: self.set_filter.clone(),
            rare_only: self.rare_only,
            rarities: self.rarity_filter.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LobbyStatus {
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub display_name: String,
    /// Guests are ephemeral identities, skipped by the session recorder.
    pub guest: bool,
}

/// One immutable record per (round, player). Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub player_id: String,
    pub correct: bool,
    pub points_awarded: u32,
    pub elapsed_millis: u64,
    pub raw_guess: String,
}

/// What a round advance produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundAdvance {
    /// Entered the given round (1-based).
    Next(u32),
    /// No cards left; the lobby is now FINISHED.
    Finished,
}

/// The central aggregate: one game room.
///
/// Exclusively owned by the registry behind a per-lobby mutex; all
/// mutation goes through these methods while that lock is held.
#[derive(Debug)]
pub struct Lobby {
    pub id: String,
    pub host_id: String,
    players: Vec<PlayerInfo>,
    status: LobbyStatus,
    pub config: GameConfig,
    cards: Vec<Card>,
    /// 1-based; 0 while WAITING. Only ever increases.
    current_round: u32,
    scores: HashMap<String, u32>,
    finished_this_round: HashSet<String>,
    /// Roster snapshot taken when the current round began. Only these
    /// players count toward "all finished" for the round.
    round_participants: Vec<String>,
    history: BTreeMap<u32, Vec<RoundOutcome>>,
    round_started_at: Option<Instant>,
    last_activity: DateTime<Utc>,
}

impl Lobby {
    pub fn new(id: String, host: PlayerInfo, config: GameConfig, cards: Vec<Card>) -> Self {
        let host_id = host.id.clone();
        let mut scores = HashMap::new();
        scores.insert(host_id.clone(), 0);
        Self {
            id,
            host_id,
            players: vec![host],
            status: LobbyStatus::Waiting,
            config,
            cards,
            current_round: 0,
            scores,
            finished_this_round: HashSet::new(),
            round_participants: Vec::new(),
            history: BTreeMap::new(),
            round_started_at: None,
            last_activity: Utc::now(),
        }
    }

    pub fn status(&self) -> LobbyStatus {
        self.status
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    /// Number of rounds this lobby will actually play. May be lower than
    /// the configured round count when the card pool came up short.
    pub fn total_rounds(&self) -> u32 {
        self.cards.len() as u32
    }

    pub fn players(&self) -> &[PlayerInfo] {
        &self.players
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.player(player_id).is_some()
    }

    pub fn scores(&self) -> &HashMap<String, u32> {
        &self.scores
    }

    pub fn history(&self) -> &BTreeMap<u32, Vec<RoundOutcome>> {
        &self.history
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Replaces the card list. Only legal before the game starts; used by
    /// the one re-fetch attempt when a lobby starts with an empty pool.
    pub fn set_cards(&mut self, cards: Vec<Card>) {
        debug_assert_eq!(self.status, LobbyStatus::Waiting);
        self.cards = cards;
    }

    /// The card for the round currently in play.
    pub fn current_card(&self) -> Option<&Card> {
        if self.current_round == 0 {
            return None;
        }
        self.cards.get(self.current_round as usize - 1)
    }

    pub fn elapsed_millis(&self, now: Instant) -> u64 {
        match self.round_started_at {
            Some(started) => now.saturating_duration_since(started).as_millis() as u64,
            None => 0,
        }
    }

    /// Adds a player to the roster.
    ///
    /// Idempotent per player id: re-joining is a successful no-op (the
    /// reconnect case), even mid-game. New players are only accepted
    /// while the roster is open.
    pub fn add_player(&mut self, player: PlayerInfo) -> Result<bool, AppError> {
        if self.has_player(&player.id) {
            return Ok(false);
        }
        if self.status != LobbyStatus::Waiting {
            return Err(AppError::AlreadyStarted);
        }
        self.scores.insert(player.id.clone(), 0);
        self.players.push(player);
        self.touch();
        Ok(true)
    }

    /// WAITING → PLAYING. Host only; requires a non-empty card list.
    pub fn start(&mut self, player_id: &str, now: Instant) -> Result<(), AppError> {
        if self.status != LobbyStatus::Waiting {
            return Err(AppError::AlreadyStarted);
        }
        if player_id != self.host_id {
            return Err(AppError::Forbidden(
                "Only the host can start the game".to_string(),
            ));
        }
        if self.cards.is_empty() {
            return Err(AppError::NoCardsAvailable);
        }
        self.status = LobbyStatus::Playing;
        self.begin_round(1, now);
        Ok(())
    }

    fn begin_round(&mut self, round: u32, now: Instant) {
        debug_assert!(round > self.current_round);
        self.current_round = round;
        self.round_started_at = Some(now);
        self.finished_this_round.clear();
        self.round_participants = self.players.iter().map(|p| p.id.clone()).collect();
        self.touch();
    }

    /// Records a player's exit from the current round and applies points.
    ///
    /// Every way out of a round (correct guess, give-up, timeout) goes
    /// through here, so "all finished" detection cannot diverge between
    /// paths. A second outcome for the same player in the same round is
    /// ignored.
    pub fn record_outcome(&mut self, outcome: RoundOutcome) {
        debug_assert!(self.status == LobbyStatus::Playing);
        if !self.finished_this_round.insert(outcome.player_id.clone()) {
            return;
        }
        *self.scores.entry(outcome.player_id.clone()).or_insert(0) += outcome.points_awarded;
        self.history
            .entry(self.current_round)
            .or_default()
            .push(outcome);
        self.touch();
    }

    pub fn has_finished_round(&self, player_id: &str) -> bool {
        self.finished_this_round.contains(player_id)
    }

    /// Whether every player present at round start has an outcome.
    pub fn all_participants_finished(&self) -> bool {
        self.round_participants
            .iter()
            .all(|p| self.finished_this_round.contains(p))
    }

    /// Participants of the current round with no outcome yet.
    pub fn unfinished_participants(&self) -> Vec<String> {
        self.round_participants
            .iter()
            .filter(|p| !self.finished_this_round.contains(*p))
            .cloned()
            .collect()
    }

    /// Moves to the next round, or to FINISHED when the cards run out.
    pub fn advance_round(&mut self, now: Instant) -> RoundAdvance {
        debug_assert!(self.status == LobbyStatus::Playing);
        let next = self.current_round + 1;
        if next > self.total_rounds() {
            self.status = LobbyStatus::Finished;
            self.round_started_at = None;
            self.touch();
            RoundAdvance::Finished
        } else {
            self.begin_round(next, now);
            RoundAdvance::Next(next)
        }
    }
}
