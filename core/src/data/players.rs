//! Player records. `players:<playerId>:data` is a hash with fields
//! `username`, `color`, `createdAt`, `lastSeen`. A lowercase username index
//! (`players:username_index`, not in the spec's key table but required to
//! enforce the case-insensitive uniqueness invariant across processes) maps
//! `lowercase(username) -> playerId`.

use crate::error::{CoreError, CoreResult};
use crate::kv::KvStore;
use serde::{Deserialize, Serialize};

const USERNAME_INDEX_KEY: &str = "players:username_index";
const ACTIVE_PLAYERS_KEY: &str = "players:active";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    pub id: String,
    pub username: String,
    pub color: String,
    pub created_at: i64,
    pub last_seen: i64,
}

fn data_key(player_id: &str) -> String {
    format!("players:{player_id}:data")
}

pub async fn find_by_username(kv: &dyn KvStore, username: &str) -> CoreResult<Option<PlayerRecord>> {
    let lowered = username.to_lowercase();
    let Some(player_id) = kv.hash_get(USERNAME_INDEX_KEY, &lowered).await? else {
        return Ok(None);
    };
    get(kv, &player_id).await
}

pub async fn get(kv: &dyn KvStore, player_id: &str) -> CoreResult<Option<PlayerRecord>> {
    let fields = kv.hash_get_all(&data_key(player_id)).await?;
    if fields.is_empty() {
        return Ok(None);
    }
    let parse_i64 = |k: &str| fields.get(k).and_then(|v| v.parse().ok()).unwrap_or(0);
    Ok(Some(PlayerRecord {
        id: player_id.to_string(),
        username: fields.get("username").cloned().unwrap_or_default(),
        color: fields.get("color").cloned().unwrap_or_default(),
        created_at: parse_i64("createdAt"),
        last_seen: parse_i64("lastSeen"),
    }))
}

pub async fn create(
    kv: &dyn KvStore,
    player_id: &str,
    username: &str,
    color: &str,
) -> CoreResult<PlayerRecord> {
    let now = now_ms();
    let key = data_key(player_id);
    kv.hash_set(&key, "username", username.to_string()).await?;
    kv.hash_set(&key, "color", color.to_string()).await?;
    kv.hash_set(&key, "createdAt", now.to_string()).await?;
    kv.hash_set(&key, "lastSeen", now.to_string()).await?;
    kv.hash_set(USERNAME_INDEX_KEY, &username.to_lowercase(), player_id.to_string())
        .await?;
    kv.zset_add(ACTIVE_PLAYERS_KEY, player_id.to_string(), now as f64).await?;

    Ok(PlayerRecord {
        id: player_id.to_string(),
        username: username.to_string(),
        color: color.to_string(),
        created_at: now,
        last_seen: now,
    })
}

pub async fn touch_last_seen(kv: &dyn KvStore, player_id: &str) -> CoreResult<()> {
    let now = now_ms();
    kv.hash_set(&data_key(player_id), "lastSeen", now.to_string()).await?;
    kv.zset_add(ACTIVE_PLAYERS_KEY, player_id.to_string(), now as f64).await?;
    Ok(())
}

/// Validates `#RRGGBB` and applies the color change; `NotFound` if the
/// player does not exist.
pub async fn set_color(kv: &dyn KvStore, player_id: &str, color: &str) -> CoreResult<()> {
    if !is_valid_hex_color(color) {
        return Err(CoreError::BadInput("color must match #RRGGBB".into()));
    }
    if get(kv, player_id).await?.is_none() {
        return Err(CoreError::NotFound(format!("player {player_id}")));
    }
    kv.hash_set(&data_key(player_id), "color", color.to_string()).await?;
    Ok(())
}

pub fn is_valid_hex_color(color: &str) -> bool {
    let bytes = color.as_bytes();
    bytes.len() == 7 && bytes[0] == b'#' && bytes[1..].iter().all(|b| b.is_ascii_hexdigit())
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    #[tokio::test]
    async fn username_lookup_is_case_insensitive() {
        let kv = MemoryKv::new();
        create(&kv, "p1", "Alice", "#e74c3c").await.unwrap();
        let found = find_by_username(&kv, "aLICE").await.unwrap().unwrap();
        assert_eq!(found.id, "p1");
    }

    #[tokio::test]
    async fn set_color_rejects_malformed_values() {
        let kv = MemoryKv::new();
        create(&kv, "p1", "Alice", "#e74c3c").await.unwrap();
        assert!(set_color(&kv, "p1", "#zzzzzz").await.is_err());
        assert!(set_color(&kv, "p1", "blue").await.is_err());
        assert!(set_color(&kv, "p1", "#123abc").await.is_ok());
    }

    #[tokio::test]
    async fn set_color_on_unknown_player_is_not_found() {
        let kv = MemoryKv::new();
        let err = set_color(&kv, "ghost", "#123456").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
