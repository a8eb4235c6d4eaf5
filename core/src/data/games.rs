//! Game records (spec §3 "Game"). `games:<gameId>:data` hash (`startPlayers`
//! stored as JSON), `games:<gameId>:players` set, `games:active` zset.

use crate::error::CoreResult;
use crate::kv::KvStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartPlayer {
    pub player_id: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub status: GameStatus,
    pub created_at: i64,
    pub lobby_start_time: i64,
    pub start_players: Vec<StartPlayer>,
    /// Seed for terrain generation (spec §9: the source omits one, added here
    /// so a replay reproduces geography deterministically).
    pub terrain_seed: u64,
}

fn data_key(game_id: &str) -> String {
    format!("games:{game_id}:data")
}

fn players_key(game_id: &str) -> String {
    format!("games:{game_id}:players")
}

const ACTIVE_GAMES_KEY: &str = "games:active";

pub async fn create(
    kv: &dyn KvStore,
    game_id: &str,
    lobby_start_time: i64,
    start_players: &[StartPlayer],
    terrain_seed: u64,
    now: i64,
) -> CoreResult<GameRecord> {
    let key = data_key(game_id);
    kv.hash_set(&key, "status", "active".to_string()).await?;
    kv.hash_set(&key, "createdAt", now.to_string()).await?;
    kv.hash_set(&key, "lobbyStartTime", lobby_start_time.to_string()).await?;
    kv.hash_set(&key, "startPlayers", serde_json::to_string(start_players)?).await?;
    kv.hash_set(&key, "terrainSeed", terrain_seed.to_string()).await?;
    kv.zset_add(ACTIVE_GAMES_KEY, game_id.to_string(), now as f64).await?;
    for sp in start_players {
        kv.set_add(&players_key(game_id), sp.player_id.clone()).await?;
    }
    Ok(GameRecord {
        id: game_id.to_string(),
        status: GameStatus::Active,
        created_at: now,
        lobby_start_time,
        start_players: start_players.to_vec(),
        terrain_seed,
    })
}

pub async fn get(kv: &dyn KvStore, game_id: &str) -> CoreResult<Option<GameRecord>> {
    let fields = kv.hash_get_all(&data_key(game_id)).await?;
    if fields.is_empty() {
        return Ok(None);
    }
    let status = if fields.get("status").map(String::as_str) == Some("closed") {
        GameStatus::Closed
    } else {
        GameStatus::Active
    };
    let start_players = fields
        .get("startPlayers")
        .map(|raw| serde_json::from_str(raw).unwrap_or_default())
        .unwrap_or_default();
    Ok(Some(GameRecord {
        id: game_id.to_string(),
        status,
        created_at: fields.get("createdAt").and_then(|v| v.parse().ok()).unwrap_or(0),
        lobby_start_time: fields.get("lobbyStartTime").and_then(|v| v.parse().ok()).unwrap_or(0),
        start_players,
        terrain_seed: fields.get("terrainSeed").and_then(|v| v.parse().ok()).unwrap_or(0),
    }))
}

pub async fn players(kv: &dyn KvStore, game_id: &str) -> CoreResult<std::collections::HashSet<String>> {
    kv.set_members(&players_key(game_id)).await
}

pub async fn close(kv: &dyn KvStore, game_id: &str) -> CoreResult<()> {
    kv.hash_set(&data_key(game_id), "status", "closed".to_string()).await?;
    kv.zset_rem(ACTIVE_GAMES_KEY, game_id).await
}
