use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use super::scoring::{REVEAL_TICK_MS, ROUND_DURATION_MS};
use super::service::GameService;

struct LobbyTimers {
    deadline: Option<JoinHandle<()>>,
    reveal: Option<JoinHandle<()>>,
}

/// Per-lobby timer management: one deadline timer and one reveal ticker,
/// cancelled and re-armed on every round transition.
///
/// Handles live in a sync mutex; nothing is awaited while it is held. At
/// most one live timer of each kind exists per lobby: arming cancels the
/// previous handle first.
pub struct RoundScheduler {
    timers: Mutex<HashMap<String, LobbyTimers>>,
}

impl Default for RoundScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundScheduler {
    pub fn new() -> Self {
        Self {
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Arms the deadline timer and reveal ticker for a round.
    ///
    /// Both tasks re-validate lobby status and round number when they
    /// fire; a stale fire after the round has moved on is a no-op.
    pub fn arm_round(&self, service: Arc<GameService>, lobby_id: &str, round: u32) {
        let deadline = tokio::spawn({
            let service = Arc::clone(&service);
            let lobby_id = lobby_id.to_string();
            async move {
                tokio::time::sleep(Duration::from_millis(ROUND_DURATION_MS)).await;
                service.handle_deadline(&lobby_id, round).await;
            }
        });

        let reveal = tokio::spawn({
            let lobby_id = lobby_id.to_string();
            async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(REVEAL_TICK_MS)).await;
                    if !service.reveal_tick(&lobby_id, round).await {
                        break;
                    }
                }
            }
        });

        let mut timers = self.timers.lock().unwrap();
        let entry = timers
            .entry(lobby_id.to_string())
            .or_insert(LobbyTimers {
                deadline: None,
                reveal: None,
            });
        if let Some(old) = entry.deadline.replace(deadline) {
            old.abort();
        }
        if let Some(old) = entry.reveal.replace(reveal) {
            old.abort();
        }
        debug!(lobby_id = %lobby_id, round = round, "Round timers armed");
    }

    /// Aborts the outstanding deadline timer. Used by the all-finished
    /// advance path, synchronously before any broadcast, so a stale
    /// deadline cannot fire into the next round.
    pub fn cancel_deadline(&self, lobby_id: &str) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(entry) = timers.get_mut(lobby_id) {
            if let Some(handle) = entry.deadline.take() {
                handle.abort();
            }
        }
    }

    /// Drops the deadline handle without aborting it. Used by the
    /// timeout path, which runs *on* the deadline task: aborting it here
    /// would kill the advance mid-flight.
    pub fn clear_deadline(&self, lobby_id: &str) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(entry) = timers.get_mut(lobby_id) {
            entry.deadline.take();
        }
    }

    /// Cancels everything for a lobby (game finished or evicted).
    pub fn cancel_all(&self, lobby_id: &str) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(entry) = timers.remove(lobby_id) {
            if let Some(handle) = entry.deadline {
                handle.abort();
            }
            if let Some(handle) = entry.reveal {
                handle.abort();
            }
            debug!(lobby_id = %lobby_id, "Round timers cancelled");
        }
    }

    #[cfg(test)]
    pub fn has_deadline(&self, lobby_id: &str) -> bool {
        let timers = self.timers.lock().unwrap();
        timers
            .get(lobby_id)
            .map(|t| t.deadline.is_some())
            .unwrap_or(false)
    }
}
