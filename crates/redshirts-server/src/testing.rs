//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use redshirts_store::Database;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::lobby::{GatewayError, LobbyDirectory, Player};

pub fn open_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("messages.db")).unwrap();
    (dir, db)
}

/// In-memory lobby service.
#[derive(Default)]
pub struct FakeLobby {
    members: Mutex<HashMap<Uuid, Uuid>>,
    refreshed: Mutex<Vec<Uuid>>,
    pub lookups: AtomicUsize,
    pub fail_refresh: AtomicBool,
}

impl FakeLobby {
    /// Put `player_id` into `lobby_id`, replacing any previous membership.
    pub fn place(&self, player_id: Uuid, lobby_id: Uuid) {
        self.members.lock().unwrap().insert(player_id, lobby_id);
    }

    pub fn refreshes(&self) -> Vec<Uuid> {
        self.refreshed.lock().unwrap().clone()
    }
}

#[async_trait]
impl LobbyDirectory for FakeLobby {
    async fn get_player(
        &self,
        _ctx: &RequestContext,
        player_id: Uuid,
    ) -> Result<Player, GatewayError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let lobby_id = self
            .members
            .lock()
            .unwrap()
            .get(&player_id)
            .copied()
            .ok_or(GatewayError::NotFound(player_id))?;
        Ok(Player {
            id: player_id,
            lobby_id,
            name: String::new(),
        })
    }

    async fn update_last_refresh(
        &self,
        _ctx: &RequestContext,
        player_id: Uuid,
    ) -> Result<(), GatewayError> {
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(GatewayError::Unreachable("connection refused".into()));
        }
        self.refreshed.lock().unwrap().push(player_id);
        Ok(())
    }
}
