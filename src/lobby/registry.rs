use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::models::Lobby;
use crate::shared::AppError;

/// Concurrent store of all active lobbies, keyed by lobby code.
///
/// The registry map itself is only locked for insert/lookup/remove.
/// Every lobby lives behind its own `Mutex`, so mutations to one lobby
/// never serialize against unrelated lobbies.
pub struct LobbyRegistry {
    lobbies: RwLock<HashMap<String, Arc<Mutex<Lobby>>>>,
}

impl Default for LobbyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self {
            lobbies: RwLock::new(HashMap::new()),
        }
    }

    /// Builds and stores a lobby under a freshly allocated short,
    /// human-typeable code.
    ///
    /// Code generation and insertion happen under the same write lock,
    /// so a generated code cannot be taken by a concurrent creation and
    /// registration cannot fail.
    pub async fn register<F>(&self, build: F) -> Arc<Mutex<Lobby>>
    where
        F: FnOnce(String) -> Lobby,
    {
        let mut lobbies = self.lobbies.write().await;
        let code = loop {
            let candidate = petname::Petnames::default().generate_one(2, "-");
            if !lobbies.contains_key(&candidate) {
                break candidate;
            }
        };
        let handle = Arc::new(Mutex::new(build(code.clone())));
        lobbies.insert(code.clone(), Arc::clone(&handle));
        info!(lobby_id = %code, "Lobby registered");
        handle
    }

    /// Inserts a fully-constructed lobby under its own id. Fails on an
    /// id already in use; `register` is the collision-free path.
    #[instrument(skip(self, lobby))]
    pub async fn insert(&self, lobby: Lobby) -> Result<Arc<Mutex<Lobby>>, AppError> {
        let id = lobby.id.clone();
        let mut lobbies = self.lobbies.write().await;
        if lobbies.contains_key(&id) {
            warn!(lobby_id = %id, "Lobby code collision on insert");
            return Err(AppError::Internal);
        }
        let handle = Arc::new(Mutex::new(lobby));
        lobbies.insert(id.clone(), Arc::clone(&handle));
        info!(lobby_id = %id, "Lobby registered");
        Ok(handle)
    }

    /// Looks up the handle for a lobby. The returned `Arc` outlives the
    /// registry lock, so callers lock the lobby itself for any access.
    pub async fn get(&self, lobby_id: &str) -> Result<Arc<Mutex<Lobby>>, AppError> {
        let lobbies = self.lobbies.read().await;
        lobbies
            .get(lobby_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Lobby not found: {}", lobby_id)))
    }

    pub async fn remove(&self, lobby_id: &str) -> bool {
        let mut lobbies = self.lobbies.write().await;
        let removed = lobbies.remove(lobby_id).is_some();
        if removed {
            debug!(lobby_id = %lobby_id, "Lobby removed from registry");
        }
        removed
    }

    pub async fn lobby_ids(&self) -> Vec<String> {
        let lobbies = self.lobbies.read().await;
        lobbies.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.lobbies.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lobbies.read().await.is_empty()
    }
}
