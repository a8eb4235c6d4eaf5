//! Process-wide shared state: the KV facade, settings, auth, and the
//! matchmaker that owns room creation. Generalizes the teacher's
//! `AppState { rooms: Mutex<HashMap<...>> }` (`relay-server::lobby`) from one
//! room kind to three, with the kickoff-into-game-room step spec §4.5
//! describes as "atomically create a game room" added on top.

use crate::rooms::game::{spawn_game_room, GameRoomHandle};
use crate::rooms::lobby::{spawn_lobby_room, LobbyRoomHandle};
use crate::rooms::replay::{spawn_replay_room, ReplayRoomHandle};
use hexgame_core::auth::Auth;
use hexgame_core::config::Settings;
use hexgame_core::data::games::StartPlayer;
use hexgame_core::error::CoreResult;
use hexgame_core::kv::KvStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The single open lobby's fixed room id. The spec's matchmaking model is one
/// pre-game staging area feeding kickoff into however many concurrent game
/// rooms exist — there is no notion of multiple simultaneous lobbies to pick
/// between, so a well-known id avoids inventing a lobby discovery endpoint.
pub const DEFAULT_LOBBY_ID: &str = "lobby";

pub struct AppState {
    pub kv: Arc<dyn KvStore>,
    pub settings: Arc<Settings>,
    pub auth: Auth,
    lobby: Mutex<Option<LobbyRoomHandle>>,
    games: Mutex<HashMap<String, GameRoomHandle>>,
    replays: Mutex<HashMap<String, ReplayRoomHandle>>,
}

impl AppState {
    pub fn new(kv: Arc<dyn KvStore>, settings: Arc<Settings>, auth: Auth) -> Arc<Self> {
        Arc::new(AppState {
            kv,
            settings,
            auth,
            lobby: Mutex::new(None),
            games: Mutex::new(HashMap::new()),
            replays: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the running lobby room, spawning a fresh one if there isn't
    /// one yet or the previous one drained and disposed.
    pub async fn get_or_create_lobby(self: &Arc<Self>) -> CoreResult<LobbyRoomHandle> {
        {
            let guard = self.lobby.lock().expect("lobby mutex poisoned");
            if let Some(handle) = guard.as_ref() {
                if !handle.is_dead() {
                    return Ok(handle.clone());
                }
            }
        }
        let handle = spawn_lobby_room(self.clone(), DEFAULT_LOBBY_ID.to_string()).await?;
        *self.lobby.lock().expect("lobby mutex poisoned") = Some(handle.clone());
        Ok(handle)
    }

    /// Called by the lobby room itself once its drain grace window expires
    /// with no one connected — clears the slot so the next join spawns fresh.
    pub fn retire_lobby(&self, lobby_id: &str) {
        let mut guard = self.lobby.lock().expect("lobby mutex poisoned");
        if guard.is_some() {
            tracing::debug!(lobby_id, "lobby slot cleared");
            *guard = None;
        }
    }

    pub fn get_game(&self, game_id: &str) -> Option<GameRoomHandle> {
        let guard = self.games.lock().expect("games mutex poisoned");
        guard.get(game_id).filter(|h| !h.is_dead()).cloned()
    }

    /// Atomically spawns a new game room for a ready roster (spec §4.5
    /// kickoff step) and registers its handle under a freshly minted id.
    pub async fn create_game(
        self: &Arc<Self>,
        start_players: Vec<StartPlayer>,
        lobby_start_time: i64,
        terrain_seed: u64,
    ) -> CoreResult<String> {
        let game_id = uuid::Uuid::new_v4().to_string();
        let handle = spawn_game_room(
            self.kv.clone(),
            self.settings.clone(),
            game_id.clone(),
            lobby_start_time,
            start_players,
            terrain_seed,
        )
        .await?;
        self.games.lock().expect("games mutex poisoned").insert(game_id.clone(), handle);
        Ok(game_id)
    }

    /// Returns the replay room for a finished game, spawning one on first
    /// request (spec §4.5 `createReplay` forwarding).
    pub async fn get_or_create_replay(self: &Arc<Self>, game_id: String) -> CoreResult<String> {
        {
            let guard = self.replays.lock().expect("replays mutex poisoned");
            if let Some(handle) = guard.get(&game_id) {
                if !handle.is_dead() {
                    return Ok(game_id);
                }
            }
        }
        let handle = spawn_replay_room(self.clone(), game_id.clone()).await?;
        self.replays.lock().expect("replays mutex poisoned").insert(game_id.clone(), handle);
        Ok(game_id)
    }

    pub fn get_replay(&self, game_id: &str) -> Option<ReplayRoomHandle> {
        let guard = self.replays.lock().expect("replays mutex poisoned");
        guard.get(game_id).filter(|h| !h.is_dead()).cloned()
    }

    pub fn retire_replay(&self, game_id: &str) {
        let mut guard = self.replays.lock().expect("replays mutex poisoned");
        guard.remove(game_id);
    }

    /// Reconciliation pass for the shutdown/watchdog task (teacher's
    /// `cleanup_dead_rooms`): drop handles whose actor task has already
    /// exited, and report live counts for `/health`.
    pub fn reap_dead_rooms(&self) {
        self.games.lock().expect("games mutex poisoned").retain(|_, h| !h.is_dead());
        self.replays.lock().expect("replays mutex poisoned").retain(|_, h| !h.is_dead());
        let mut lobby = self.lobby.lock().expect("lobby mutex poisoned");
        if lobby.as_ref().is_some_and(|h| h.is_dead()) {
            *lobby = None;
        }
    }

    pub fn active_room_count(&self) -> usize {
        let games = self.games.lock().expect("games mutex poisoned").len();
        let replays = self.replays.lock().expect("replays mutex poisoned").len();
        let lobby = if self.lobby.lock().expect("lobby mutex poisoned").is_some() { 1 } else { 0 };
        games + replays + lobby
    }
}
