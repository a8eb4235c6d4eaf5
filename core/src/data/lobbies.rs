//! Lobby records (spec §3 "Lobby", §4.5). `lobbies:<lobbyId>:data` hash,
//! `lobbies:<lobbyId>:players` set, `lobbies:active` zset.

use crate::error::CoreResult;
use crate::kv::KvStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyRecord {
    pub id: String,
    pub status: LobbyStatus,
    pub created_at: i64,
    pub lobby_start_time: Option<i64>,
}

fn data_key(lobby_id: &str) -> String {
    format!("lobbies:{lobby_id}:data")
}

fn players_key(lobby_id: &str) -> String {
    format!("lobbies:{lobby_id}:players")
}

const ACTIVE_LOBBIES_KEY: &str = "lobbies:active";

pub async fn create(kv: &dyn KvStore, lobby_id: &str, now: i64) -> CoreResult<LobbyRecord> {
    let key = data_key(lobby_id);
    kv.hash_set(&key, "status", "active".to_string()).await?;
    kv.hash_set(&key, "createdAt", now.to_string()).await?;
    kv.zset_add(ACTIVE_LOBBIES_KEY, lobby_id.to_string(), now as f64).await?;
    Ok(LobbyRecord {
        id: lobby_id.to_string(),
        status: LobbyStatus::Active,
        created_at: now,
        lobby_start_time: None,
    })
}

pub async fn get(kv: &dyn KvStore, lobby_id: &str) -> CoreResult<Option<LobbyRecord>> {
    let fields = kv.hash_get_all(&data_key(lobby_id)).await?;
    if fields.is_empty() {
        return Ok(None);
    }
    let status = if fields.get("status").map(String::as_str) == Some("closed") {
        LobbyStatus::Closed
    } else {
        LobbyStatus::Active
    };
    Ok(Some(LobbyRecord {
        id: lobby_id.to_string(),
        status,
        created_at: fields.get("createdAt").and_then(|v| v.parse().ok()).unwrap_or(0),
        lobby_start_time: fields.get("lobbyStartTime").and_then(|v| v.parse().ok()),
    }))
}

pub async fn set_start_time(kv: &dyn KvStore, lobby_id: &str, start_time: i64) -> CoreResult<()> {
    kv.hash_set(&data_key(lobby_id), "lobbyStartTime", start_time.to_string()).await
}

pub async fn add_player(kv: &dyn KvStore, lobby_id: &str, player_id: &str) -> CoreResult<()> {
    kv.set_add(&players_key(lobby_id), player_id.to_string()).await
}

pub async fn remove_player(kv: &dyn KvStore, lobby_id: &str, player_id: &str) -> CoreResult<()> {
    kv.set_rem(&players_key(lobby_id), player_id).await
}

pub async fn players(kv: &dyn KvStore, lobby_id: &str) -> CoreResult<std::collections::HashSet<String>> {
    kv.set_members(&players_key(lobby_id)).await
}

pub async fn close(kv: &dyn KvStore, lobby_id: &str) -> CoreResult<()> {
    kv.hash_set(&data_key(lobby_id), "status", "closed".to_string()).await?;
    kv.zset_rem(ACTIVE_LOBBIES_KEY, lobby_id).await
}
