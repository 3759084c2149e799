use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::scheduler::RoundScheduler;
use super::scoring::{evaluate_guess, ROUND_DURATION_MS};
use crate::broadcast::{
    GameStartedPayload, GuessResultPayload, MessageType, NextRoundPayload, OutboundMessage,
    PlayerStatus, ProgressiveRevealPayload, RevealPayload, RevealedCard, RoomBroadcaster,
    RoundEndReason, RoundFinishedPayload,
};
use crate::broadcast::messages::PlayerJoinedPayload;
use crate::cards::provider::{gather_cards, CardProvider};
use crate::lobby::models::{GameConfig, Lobby, LobbyStatus, PlayerInfo, RoundAdvance, RoundOutcome};
use crate::lobby::registry::LobbyRegistry;
use crate::lobby::types::LobbyStatusResponse;
use crate::recorder::{build_records, SessionRecorder};
use crate::shared::AppError;

/// Sentinel recorded as the "guess" when a player gives up.
pub const GIVE_UP_GUESS: &str = "(gave up)";
/// Sentinel recorded when the deadline fires on an unfinished player.
pub const TIMEOUT_GUESS: &str = "(timeout)";

/// All lobby mutations go through this service.
///
/// Each operation takes the target lobby's mutex for its whole read-
/// modify-write, so guesses, give-ups, joins, starts and timer fires of
/// one lobby serialize against each other while unrelated lobbies
/// proceed in parallel.
pub struct GameService {
    registry: Arc<LobbyRegistry>,
    card_provider: Arc<dyn CardProvider + Send + Sync>,
    broadcaster: Arc<dyn RoomBroadcaster + Send + Sync>,
    recorder: Arc<dyn SessionRecorder + Send + Sync>,
    scheduler: RoundScheduler,
    /// Handed to spawned timer tasks so they can call back in.
    self_ref: Weak<GameService>,
}

impl GameService {
    pub fn new(
        registry: Arc<LobbyRegistry>,
        card_provider: Arc<dyn CardProvider + Send + Sync>,
        broadcaster: Arc<dyn RoomBroadcaster + Send + Sync>,
        recorder: Arc<dyn SessionRecorder + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            registry,
            card_provider,
            broadcaster,
            recorder,
            scheduler: RoundScheduler::new(),
            self_ref: weak.clone(),
        })
    }

    /// Creates a lobby. Cards are gathered up front, before the lobby is
    /// visible to joiners, and without holding any lobby or registry
    /// lock, so creating one lobby never stalls another.
    #[instrument(skip(self, config))]
    pub async fn create_lobby(
        &self,
        player_id: Option<String>,
        display_name: String,
        guest: bool,
        config: GameConfig,
    ) -> Result<LobbyStatusResponse, AppError> {
        config.validate()?;

        let host_id = player_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let filter = config.card_filter();
        let cards = gather_cards(
            self.card_provider.as_ref(),
            &filter,
            config.round_count as usize,
        )
        .await?;

        let host = PlayerInfo {
            id: host_id,
            display_name,
            guest,
        };
        let handle = self
            .registry
            .register(|code| Lobby::new(code, host, config, cards))
            .await;

        let snapshot = Self::snapshot(&*handle.lock().await);
        info!(lobby_id = %snapshot.id, host_id = %snapshot.host_id, "Lobby created");
        Ok(snapshot)
    }

    /// Adds a player to a WAITING lobby. Idempotent per player id.
    #[instrument(skip(self, display_name))]
    pub async fn join_lobby(
        &self,
        lobby_id: &str,
        player_id: Option<String>,
        display_name: String,
        guest: bool,
    ) -> Result<LobbyStatusResponse, AppError> {
        let handle = self.registry.get(lobby_id).await?;
        let mut lobby = handle.lock().await;

        let id = player_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let added = lobby.add_player(PlayerInfo {
            id: id.clone(),
            display_name: display_name.clone(),
            guest,
        })?;
        let snapshot = Self::snapshot(&lobby);
        let statuses = Self::statuses(&lobby);
        drop(lobby);

        if added {
            info!(lobby_id = %lobby_id, player_id = %id, "Player joined lobby");
            let payload = PlayerJoinedPayload {
                player_id: id,
                display_name,
                player_statuses: statuses,
            };
            self.broadcaster
                .broadcast(lobby_id, OutboundMessage::new(MessageType::PlayerJoined, &payload))
                .await;
        }

        Ok(snapshot)
    }

    /// WAITING → PLAYING. Host only. Re-fetches cards once if the pool
    /// came up empty at creation, then fails with NoCardsAvailable.
    #[instrument(skip(self))]
    pub async fn start_game(
        &self,
        lobby_id: &str,
        player_id: &str,
    ) -> Result<GameStartedPayload, AppError> {
        let handle = self.registry.get(lobby_id).await?;
        let mut lobby = handle.lock().await;

        if lobby.status() != LobbyStatus::Waiting {
            return Err(AppError::AlreadyStarted);
        }
        if lobby.host_id != player_id {
            return Err(AppError::Forbidden(
                "Only the host can start the game".to_string(),
            ));
        }
        if lobby.cards().is_empty() {
            warn!(lobby_id = %lobby_id, "Lobby has no cards at start, re-fetching once");
            let filter = lobby.config.card_filter();
            let count = lobby.config.round_count as usize;
            let cards = gather_cards(self.card_provider.as_ref(), &filter, count).await?;
            if cards.is_empty() {
                return Err(AppError::NoCardsAvailable);
            }
            lobby.set_cards(cards);
        }

        let now = Instant::now();
        lobby.start(player_id, now)?;
        info!(
            lobby_id = %lobby_id,
            total_rounds = lobby.total_rounds(),
            "Game started"
        );

        let payload = GameStartedPayload {
            round: lobby.current_round(),
            total_rounds: lobby.total_rounds(),
            reveal: Self::reveal(&lobby, now),
            player_statuses: Self::statuses(&lobby),
        };
        self.broadcaster
            .broadcast(
                lobby_id,
                OutboundMessage::new(MessageType::GameStarted, &payload),
            )
            .await;
        self.arm_round(lobby_id, lobby.current_round());

        Ok(payload)
    }

    /// Evaluates one guess for the current round.
    ///
    /// A miss is a normal negative result, not an error, and does not
    /// finish the player's round. Card identity is only disclosed on a
    /// match. The result goes to the guessing player alone; round
    /// completion is broadcast separately by the advance path.
    #[instrument(skip(self, raw_guess))]
    pub async fn make_guess(
        &self,
        lobby_id: &str,
        player_id: &str,
        raw_guess: &str,
    ) -> Result<GuessResultPayload, AppError> {
        let handle = self.registry.get(lobby_id).await?;
        let mut lobby = handle.lock().await;

        Self::check_active_participant(&lobby, player_id)?;

        let now = Instant::now();
        let elapsed = lobby.elapsed_millis(now);
        let card = lobby.current_card().cloned().ok_or(AppError::Internal)?;
        let eval = evaluate_guess(raw_guess, &card.display_name, elapsed);

        let payload = if eval.kind.is_match() {
            debug!(
                lobby_id = %lobby_id,
                player_id = %player_id,
                kind = ?eval.kind,
                points = eval.points,
                elapsed_millis = elapsed,
                "Guess matched"
            );
            lobby.record_outcome(RoundOutcome {
                player_id: player_id.to_string(),
                correct: true,
                points_awarded: eval.points,
                elapsed_millis: elapsed,
                raw_guess: raw_guess.to_string(),
            });
            GuessResultPayload {
                correct: true,
                name: Some(card.display_name.clone()),
                full_image_ref: Some(card.full_image_ref.clone()),
                set_name: Some(card.set_name.clone()),
                points_awarded: eval.points,
                round_finished: lobby.all_participants_finished(),
                scores: lobby.scores().clone(),
                player_statuses: Self::statuses(&lobby),
            }
        } else {
            GuessResultPayload {
                correct: false,
                name: None,
                full_image_ref: None,
                set_name: None,
                points_awarded: 0,
                round_finished: false,
                scores: lobby.scores().clone(),
                player_statuses: Self::statuses(&lobby),
            }
        };

        self.broadcaster
            .send_to_player(
                lobby_id,
                player_id,
                OutboundMessage::new(MessageType::GuessResult, &payload),
            )
            .await;

        if payload.round_finished {
            self.advance_locked(&mut lobby, RoundEndReason::Normal).await;
        }

        Ok(payload)
    }

    /// Records a forfeit for the current round: false outcome, zero
    /// points, elapsed time attributed. Uses the same finish bookkeeping
    /// as a correct guess, so "all finished" detection is unaffected by
    /// how a player exits the round. The card is revealed to the player.
    #[instrument(skip(self))]
    pub async fn give_up(
        &self,
        lobby_id: &str,
        player_id: &str,
    ) -> Result<GuessResultPayload, AppError> {
        let handle = self.registry.get(lobby_id).await?;
        let mut lobby = handle.lock().await;

        Self::check_active_participant(&lobby, player_id)?;

        let now = Instant::now();
        let elapsed = lobby.elapsed_millis(now);
        let card = lobby.current_card().cloned().ok_or(AppError::Internal)?;

        lobby.record_outcome(RoundOutcome {
            player_id: player_id.to_string(),
            correct: false,
            points_awarded: 0,
            elapsed_millis: elapsed,
            raw_guess: GIVE_UP_GUESS.to_string(),
        });
        debug!(lobby_id = %lobby_id, player_id = %player_id, "Player gave up");

        let payload = GuessResultPayload {
            correct: false,
            name: Some(card.display_name.clone()),
            full_image_ref: Some(card.full_image_ref.clone()),
            set_name: Some(card.set_name.clone()),
            points_awarded: 0,
            round_finished: lobby.all_participants_finished(),
            scores: lobby.scores().clone(),
            player_statuses: Self::statuses(&lobby),
        };

        self.broadcaster
            .send_to_player(
                lobby_id,
                player_id,
                OutboundMessage::new(MessageType::GuessResult, &payload),
            )
            .await;

        if payload.round_finished {
            self.advance_locked(&mut lobby, RoundEndReason::Normal).await;
        }

        Ok(payload)
    }

    /// Read-only status snapshot; sees only fully-committed states.
    pub async fn lobby_status(&self, lobby_id: &str) -> Result<LobbyStatusResponse, AppError> {
        let handle = self.registry.get(lobby_id).await?;
        let lobby = handle.lock().await;
        Ok(Self::snapshot(&lobby))
    }

    /// Removes a lobby and tears down its timers.
    pub async fn evict_lobby(&self, lobby_id: &str) -> bool {
        self.scheduler.cancel_all(lobby_id);
        self.registry.remove(lobby_id).await
    }

    /// Deadline fire. A stale fire (round already advanced, or the lobby
    /// finished or vanished) is an expected race and a silent no-op.
    pub(crate) async fn handle_deadline(&self, lobby_id: &str, round: u32) {
        let handle = match self.registry.get(lobby_id).await {
            Ok(handle) => handle,
            Err(_) => return,
        };
        let mut lobby = handle.lock().await;

        if lobby.status() != LobbyStatus::Playing || lobby.current_round() != round {
            debug!(
                lobby_id = %lobby_id,
                armed_round = round,
                current_round = lobby.current_round(),
                "Stale deadline fire ignored"
            );
            return;
        }

        info!(lobby_id = %lobby_id, round = round, "Round deadline reached, forcing advance");

        // This runs on the deadline task itself; drop the handle without
        // aborting so the advance below survives.
        self.scheduler.clear_deadline(lobby_id);

        for player_id in lobby.unfinished_participants() {
            lobby.record_outcome(RoundOutcome {
                player_id,
                correct: false,
                points_awarded: 0,
                elapsed_millis: ROUND_DURATION_MS,
                raw_guess: TIMEOUT_GUESS.to_string(),
            });
        }

        self.advance_locked(&mut lobby, RoundEndReason::Timeout).await;
    }

    /// Reveal ticker body. Read-only: never touches scores, finish sets
    /// or the round number. Returns false to stop the ticker.
    pub(crate) async fn reveal_tick(&self, lobby_id: &str, round: u32) -> bool {
        let handle = match self.registry.get(lobby_id).await {
            Ok(handle) => handle,
            Err(_) => return false,
        };
        let lobby = handle.lock().await;
        if lobby.status() != LobbyStatus::Playing || lobby.current_round() != round {
            return false;
        }
        let payload = ProgressiveRevealPayload {
            reveal: Self::reveal(&lobby, Instant::now()),
        };
        drop(lobby);

        self.broadcaster
            .broadcast(
                lobby_id,
                OutboundMessage::new(MessageType::ProgressiveReveal, &payload),
            )
            .await;
        true
    }

    /// The single round-advance routine, shared by the all-finished and
    /// the timeout paths; only the reason differs. Caller holds the
    /// lobby lock. The outstanding deadline is cancelled before any
    /// broadcast so it cannot fire into round N+2.
    async fn advance_locked(&self, lobby: &mut Lobby, reason: RoundEndReason) {
        if reason == RoundEndReason::Normal {
            self.scheduler.cancel_deadline(&lobby.id);
        }

        let finished_round = lobby.current_round();
        if let Some(card) = lobby.current_card().cloned() {
            let payload = RoundFinishedPayload {
                round: finished_round,
                reason,
                result: RevealedCard {
                    name: card.display_name,
                    full_image_ref: card.full_image_ref,
                    set_name: card.set_name,
                },
                scores: lobby.scores().clone(),
                player_statuses: Self::statuses(lobby),
            };
            self.broadcaster
                .broadcast(
                    &lobby.id,
                    OutboundMessage::new(MessageType::RoundFinished, &payload),
                )
                .await;
        }

        let now = Instant::now();
        match lobby.advance_round(now) {
            RoundAdvance::Next(next) => {
                debug!(lobby_id = %lobby.id, round = next, "Advancing to next round");
                let payload = NextRoundPayload::Playing {
                    round: next,
                    total_rounds: lobby.total_rounds(),
                    reveal: Self::reveal(lobby, now),
                    player_statuses: Self::statuses(lobby),
                };
                self.broadcaster
                    .broadcast(
                        &lobby.id,
                        OutboundMessage::new(MessageType::NextRound, &payload),
                    )
                    .await;
                self.arm_round(&lobby.id, next);
            }
            RoundAdvance::Finished => {
                info!(lobby_id = %lobby.id, "Game finished");
                self.scheduler.cancel_all(&lobby.id);
                let payload = NextRoundPayload::Finished {
                    scores: lobby.scores().clone(),
                    history: lobby.history().clone().into_iter().collect(),
                    player_statuses: Self::statuses(lobby),
                };
                self.broadcaster
                    .broadcast(
                        &lobby.id,
                        OutboundMessage::new(MessageType::NextRound, &payload),
                    )
                    .await;
                self.dispatch_records(lobby);
            }
        }
    }

    /// Hands final per-player history to the session recorder.
    /// Best-effort: runs on its own task and never blocks the lobby.
    fn dispatch_records(&self, lobby: &Lobby) {
        let records = build_records(lobby);
        if records.is_empty() {
            return;
        }
        let recorder = Arc::clone(&self.recorder);
        let lobby_id = lobby.id.clone();
        tokio::spawn(async move {
            recorder.record_game(&lobby_id, records).await;
        });
    }

    fn arm_round(&self, lobby_id: &str, round: u32) {
        if let Some(service) = self.self_ref.upgrade() {
            self.scheduler.arm_round(service, lobby_id, round);
        }
    }

    fn check_active_participant(lobby: &Lobby, player_id: &str) -> Result<(), AppError> {
        if lobby.status() != LobbyStatus::Playing {
            return Err(AppError::GameNotActive);
        }
        if !lobby.has_player(player_id) {
            return Err(AppError::Forbidden(
                "Player is not in this lobby".to_string(),
            ));
        }
        if lobby.has_finished_round(player_id) {
            return Err(AppError::BadRequest(
                "Round already finished for this player".to_string(),
            ));
        }
        Ok(())
    }

    fn reveal(lobby: &Lobby, now: Instant) -> RevealPayload {
        let fraction =
            (lobby.elapsed_millis(now) as f64 / ROUND_DURATION_MS as f64).clamp(0.0, 1.0);
        RevealPayload {
            partial_reveal: lobby
                .current_card()
                .map(|c| c.partial_reveal.clone())
                .unwrap_or_default(),
            revealed_fraction: fraction,
        }
    }

    fn statuses(lobby: &Lobby) -> Vec<PlayerStatus> {
        lobby
            .players()
            .iter()
            .map(|p| PlayerStatus {
                player_id: p.id.clone(),
                display_name: p.display_name.clone(),
                score: lobby.scores().get(&p.id).copied().unwrap_or(0),
                finished_round: lobby.has_finished_round(&p.id),
            })
            .collect()
    }

    fn snapshot(lobby: &Lobby) -> LobbyStatusResponse {
        LobbyStatusResponse {
            id: lobby.id.clone(),
            host_id: lobby.host_id.clone(),
            status: lobby.status(),
            current_round: lobby.current_round(),
            total_rounds: lobby.total_rounds(),
            players: Self::statuses(lobby),
            scores: lobby.scores().clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn scheduler(&self) -> &RoundScheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelBroadcaster;
    use crate::cards::provider::StaticCardProvider;
    use crate::cards::Card;
    use crate::recorder::LoggingRecorder;

    fn card(id: &str, name: &str) -> Card {
        Card {
            id: id.to_string(),
            display_name: name.to_string(),
            full_image_ref: format!("https://img.example/{}/high.png", id),
            set_name: "base1".to_string(),
            rarity_label: "Rare".to_string(),
            partial_reveal: format!("crop-{}", id),
        }
    }

    fn config(rounds: u32) -> GameConfig {
        GameConfig {
            round_count: rounds,
            set_filter: vec!["all".to_string()],
            rare_only: false,
            rarity_filter: None,
        }
    }

    fn service_with_cards(cards: Vec<Card>) -> Arc<GameService> {
        GameService::new(
            Arc::new(LobbyRegistry::new()),
            Arc::new(StaticCardProvider::new(cards)),
            Arc::new(ChannelBroadcaster::new()),
            Arc::new(LoggingRecorder),
        )
    }

    #[tokio::test]
    async fn create_join_and_status() {
        let service = service_with_cards(vec![card("a", "Pikachu"), card("b", "Évoli")]);

        let lobby = service
            .create_lobby(Some("alice".into()), "Alice".into(), false, config(2))
            .await
            .unwrap();
        assert_eq!(lobby.status, LobbyStatus::Waiting);
        assert_eq!(lobby.total_rounds, 2);

        service
            .join_lobby(&lobby.id, Some("bob".into()), "Bob".into(), false)
            .await
            .unwrap();
        // Idempotent re-join.
        let after = service
            .join_lobby(&lobby.id, Some("bob".into()), "Bob".into(), false)
            .await
            .unwrap();
        assert_eq!(after.players.len(), 2);

        let status = service.lobby_status(&lobby.id).await.unwrap();
        assert_eq!(status.players.len(), 2);
        assert_eq!(status.current_round, 0);
    }

    #[tokio::test]
    async fn joining_unknown_lobby_is_not_found() {
        let service = service_with_cards(vec![]);
        let err = service
            .join_lobby("missing", Some("bob".into()), "Bob".into(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn non_host_cannot_start() {
        let service = service_with_cards(vec![card("a", "Pikachu")]);
        let lobby = service
            .create_lobby(Some("alice".into()), "Alice".into(), false, config(1))
            .await
            .unwrap();
        service
            .join_lobby(&lobby.id, Some("bob".into()), "Bob".into(), false)
            .await
            .unwrap();

        let err = service.start_game(&lobby.id, "bob").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn start_with_empty_pool_is_no_cards_available() {
        let service = service_with_cards(vec![]);
        let lobby = service
            .create_lobby(Some("alice".into()), "Alice".into(), false, config(1))
            .await
            .unwrap();

        let err = service.start_game(&lobby.id, "alice").await.unwrap_err();
        assert!(matches!(err, AppError::NoCardsAvailable));
    }

    #[tokio::test]
    async fn guess_outside_playing_is_game_not_active() {
        let service = service_with_cards(vec![card("a", "Pikachu")]);
        let lobby = service
            .create_lobby(Some("alice".into()), "Alice".into(), false, config(1))
            .await
            .unwrap();

        let err = service
            .make_guess(&lobby.id, "alice", "pikachu")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GameNotActive));
    }

    #[tokio::test(start_paused = true)]
    async fn finishing_the_game_tears_down_timers() {
        let service = service_with_cards(vec![card("a", "Pikachu")]);
        let lobby = service
            .create_lobby(Some("alice".into()), "Alice".into(), false, config(1))
            .await
            .unwrap();
        service.start_game(&lobby.id, "alice").await.unwrap();
        assert!(service.scheduler().has_deadline(&lobby.id));

        service
            .make_guess(&lobby.id, "alice", "pikachu")
            .await
            .unwrap();

        let status = service.lobby_status(&lobby.id).await.unwrap();
        assert_eq!(status.status, LobbyStatus::Finished);
        assert!(!service.scheduler().has_deadline(&lobby.id));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_guess_does_not_reveal_or_finish() {
        let service = service_with_cards(vec![card("a", "Pikachu")]);
        let lobby = service
            .create_lobby(Some("alice".into()), "Alice".into(), false, config(1))
            .await
            .unwrap();
        service.start_game(&lobby.id, "alice").await.unwrap();

        let result = service
            .make_guess(&lobby.id, "alice", "dracaufeu")
            .await
            .unwrap();
        assert!(!result.correct);
        assert!(result.name.is_none());
        assert!(!result.round_finished);

        // Still a participant waiting on the round.
        let status = service.lobby_status(&lobby.id).await.unwrap();
        assert_eq!(status.current_round, 1);
        assert!(!status.players[0].finished_round);
    }
}
