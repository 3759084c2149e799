use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, instrument};

use super::registry::LobbyRegistry;
use crate::game::service::GameService;

/// Configuration for the lobby eviction task
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// How often to scan for evictable lobbies
    pub cleanup_interval: Duration,
    /// How long a lobby may sit idle (or finished) before eviction
    pub retention: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(30 * 60),
        }
    }
}

/// Starts the background task that evicts finished and abandoned lobbies.
#[instrument(skip(registry, game_service, config))]
pub async fn start_cleanup_task(
    registry: Arc<LobbyRegistry>,
    game_service: Arc<GameService>,
    config: CleanupConfig,
) {
    info!(
        cleanup_interval_secs = config.cleanup_interval.as_secs(),
        retention_secs = config.retention.as_secs(),
        "Starting lobby cleanup background task"
    );

    let mut cleanup_interval = interval(config.cleanup_interval);

    loop {
        cleanup_interval.tick().await;
        let evicted = evict_stale_lobbies(&registry, &game_service, config.retention).await;
        if evicted > 0 {
            info!(evicted_count = evicted, "Lobby cleanup completed");
        }
    }
}

/// Evicts every lobby whose last activity is older than the retention
/// window. Finished lobbies linger for the same window so late status
/// reads still resolve, then go away.
pub async fn evict_stale_lobbies(
    registry: &Arc<LobbyRegistry>,
    game_service: &Arc<GameService>,
    retention: Duration,
) -> usize {
    let cutoff = chrono::Utc::now()
        - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());

    let mut evicted = 0;
    for lobby_id in registry.lobby_ids().await {
        let Ok(handle) = registry.get(&lobby_id).await else {
            continue;
        };
        let stale = {
            let lobby = handle.lock().await;
            // A finished lobby is frozen, so its last_activity stops
            // moving and the same cutoff retires it.
            lobby.last_activity() < cutoff
        };
        if stale && game_service.evict_lobby(&lobby_id).await {
            debug!(lobby_id = %lobby_id, "Evicted stale lobby");
            evicted += 1;
        }
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelBroadcaster;
    use crate::cards::provider::StaticCardProvider;
    use crate::lobby::models::GameConfig;
    use crate::recorder::LoggingRecorder;

    fn setup() -> (Arc<LobbyRegistry>, Arc<GameService>) {
        let registry = Arc::new(LobbyRegistry::new());
        let service = GameService::new(
            Arc::clone(&registry),
            Arc::new(StaticCardProvider::new(vec![])),
            Arc::new(ChannelBroadcaster::new()),
            Arc::new(LoggingRecorder),
        );
        (registry, service)
    }

    fn config() -> GameConfig {
        GameConfig {
            round_count: 1,
            set_filter: vec!["all".to_string()],
            rare_only: false,
            rarity_filter: None,
        }
    }

    #[tokio::test]
    async fn fresh_lobbies_survive_cleanup() {
        let (registry, service) = setup();
        service
            .create_lobby(Some("alice".into()), "Alice".into(), false, config())
            .await
            .unwrap();

        let evicted =
            evict_stale_lobbies(&registry, &service, Duration::from_secs(3600)).await;
        assert_eq!(evicted, 0);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn idle_lobbies_are_evicted() {
        let (registry, service) = setup();
        service
            .create_lobby(Some("alice".into()), "Alice".into(), false, config())
            .await
            .unwrap();

        // Zero retention: anything not touched this instant is stale.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let evicted = evict_stale_lobbies(&registry, &service, Duration::ZERO).await;
        assert_eq!(evicted, 1);
        assert!(registry.is_empty().await);
    }
}
