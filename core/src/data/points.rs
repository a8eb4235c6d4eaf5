//! PlayerPoints records (spec §3, §4.3). `games:<gameId>:points` hash,
//! field = playerId, value JSON.

use crate::data::hexes::calculate_max_points;
use crate::error::CoreResult;
use crate::kv::KvStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerPoints {
    pub points: i64,
    pub max_points: i64,
    pub start_q: i32,
    pub start_r: i32,
    pub last_update: i64,
}

fn points_key(game_id: &str) -> String {
    format!("games:{game_id}:points")
}

/// On miss, initializes to `(startingPoints, startingMaxPoints)`. On hit,
/// overlays a freshly computed `maxPoints` so the cap is never stale (spec
/// §4.3) — this is the ONLY read path; callers must never read the stored
/// `maxPoints` field directly.
pub async fn get_player_points(
    kv: &dyn KvStore,
    game_id: &str,
    player_id: &str,
    starting_points: i64,
    starting_max_points: i64,
) -> CoreResult<PlayerPoints> {
    let fresh_max = calculate_max_points(kv, game_id, player_id, starting_max_points).await?;
    let raw = kv.hash_get(&points_key(game_id), player_id).await?;
    let Some(raw) = raw else {
        let points = PlayerPoints {
            points: starting_points,
            max_points: fresh_max,
            start_q: 0,
            start_r: 0,
            last_update: now_ms(),
        };
        write(kv, game_id, player_id, &points).await?;
        return Ok(points);
    };
    let mut stored: PlayerPoints = serde_json::from_str(&raw)?;
    stored.max_points = fresh_max;
    stored.points = stored.points.clamp(0, fresh_max);
    Ok(stored)
}

/// Clamps to `[0, calculateMaxPoints(...)]`, preserves `startQ/startR`, writes
/// back (spec §4.3).
pub async fn update_player_points(
    kv: &dyn KvStore,
    game_id: &str,
    player_id: &str,
    new_points: i64,
    starting_max_points: i64,
) -> CoreResult<PlayerPoints> {
    let max_points = calculate_max_points(kv, game_id, player_id, starting_max_points).await?;
    let existing = kv.hash_get(&points_key(game_id), player_id).await?;
    let (start_q, start_r) = existing
        .as_deref()
        .and_then(|raw| serde_json::from_str::<PlayerPoints>(raw).ok())
        .map(|p| (p.start_q, p.start_r))
        .unwrap_or((0, 0));

    let record = PlayerPoints {
        points: new_points.clamp(0, max_points),
        max_points,
        start_q,
        start_r,
        last_update: now_ms(),
    };
    write(kv, game_id, player_id, &record).await?;
    Ok(record)
}

pub async fn set_start_position(
    kv: &dyn KvStore,
    game_id: &str,
    player_id: &str,
    q: i32,
    r: i32,
    starting_points: i64,
    starting_max_points: i64,
) -> CoreResult<()> {
    let mut points = get_player_points(kv, game_id, player_id, starting_points, starting_max_points).await?;
    points.start_q = q;
    points.start_r = r;
    write(kv, game_id, player_id, &points).await
}

async fn write(kv: &dyn KvStore, game_id: &str, player_id: &str, points: &PlayerPoints) -> CoreResult<()> {
    kv.hash_set(&points_key(game_id), player_id, serde_json::to_string(points)?).await
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
    use crate::data::hexes::set_hex;
    use crate::kv::MemoryKv;
    use protocol::hex::Hex;

    #[tokio::test]
    async fn miss_initializes_to_starting_values() {
        let kv = MemoryKv::new();
        let points = get_player_points(&kv, "g1", "p1", 200, 200).await.unwrap();
        assert_eq!(points.points, 200);
        assert_eq!(points.max_points, 200);
    }

    #[tokio::test]
    async fn update_clamps_to_current_max() {
        let kv = MemoryKv::new();
        get_player_points(&kv, "g1", "p1", 200, 200).await.unwrap();
        let updated = update_player_points(&kv, "g1", "p1", 500, 200).await.unwrap();
        assert_eq!(updated.points, 200);
        let updated = update_player_points(&kv, "g1", "p1", -5, 200).await.unwrap();
        assert_eq!(updated.points, 0);
    }

    #[tokio::test]
    async fn cap_rises_with_tiles_and_is_never_stale() {
        let kv = MemoryKv::new();
        get_player_points(&kv, "g1", "p1", 200, 200).await.unwrap();
        set_hex(&kv, "g1", Hex::new(0, 0), Some("p1"), Some("#fff"), None, None, true, 0)
            .await
            .unwrap();
        let points = get_player_points(&kv, "g1", "p1", 200, 200).await.unwrap();
        assert_eq!(points.max_points, 205);
    }
}
