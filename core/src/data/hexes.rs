//! Hex records (spec §3 "Hex", §4.3). `games:<gameId>:hexes` hash, field
//! `"q:r"`, value JSON-encoded [`HexRecord`].

use crate::error::CoreResult;
use crate::kv::KvStore;
use protocol::hex::Hex;
use protocol::{Terrain, Upgrade};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HexRecord {
    pub player_id: Option<String>,
    pub color: Option<String>,
    pub upgrade: Option<Upgrade>,
    pub terrain: Option<Terrain>,
    pub capture_time: i64,
    pub is_start: bool,
}

impl HexRecord {
    pub fn unowned() -> Self {
        HexRecord {
            player_id: None,
            color: None,
            upgrade: None,
            terrain: None,
            capture_time: 0,
            is_start: false,
        }
    }
}

fn hexes_key(game_id: &str) -> String {
    format!("games:{game_id}:hexes")
}

pub async fn get_hex(kv: &dyn KvStore, game_id: &str, hex: Hex) -> CoreResult<Option<HexRecord>> {
    let raw = kv.hash_get(&hexes_key(game_id), &hex.field_key()).await?;
    Ok(match raw {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    })
}

pub async fn all_hexes(kv: &dyn KvStore, game_id: &str) -> CoreResult<HashMap<Hex, HexRecord>> {
    let raw = kv.hash_get_all(&hexes_key(game_id)).await?;
    let mut out = HashMap::with_capacity(raw.len());
    for (field, value) in raw {
        if let Some(hex) = Hex::parse_field_key(&field) {
            out.insert(hex, serde_json::from_str(&value)?);
        }
    }
    Ok(out)
}

/// Upsert. `upgrade`/`terrain` omitted means empty — the PREVIOUS value is
/// NOT preserved (spec §4.3). Callers who want to preserve upgrade across an
/// ownership change must use [`set_hex_upgrade`] or read-modify-write.
pub async fn set_hex(
    kv: &dyn KvStore,
    game_id: &str,
    hex: Hex,
    player_id: Option<&str>,
    color: Option<&str>,
    upgrade: Option<Upgrade>,
    terrain: Option<Terrain>,
    is_start: bool,
    capture_time: i64,
) -> CoreResult<()> {
    let record = HexRecord {
        player_id: player_id.map(String::from),
        color: color.map(String::from),
        upgrade,
        terrain,
        capture_time,
        is_start,
    };
    kv.hash_set(&hexes_key(game_id), &hex.field_key(), serde_json::to_string(&record)?)
        .await
}

/// Read-modify-write of the single hex's upgrade, preserving owner, color,
/// and terrain (spec §4.3).
pub async fn set_hex_upgrade(
    kv: &dyn KvStore,
    game_id: &str,
    hex: Hex,
    upgrade: Upgrade,
) -> CoreResult<()> {
    let mut record = get_hex(kv, game_id, hex).await?.unwrap_or_else(HexRecord::unowned);
    record.upgrade = Some(upgrade);
    kv.hash_set(&hexes_key(game_id), &hex.field_key(), serde_json::to_string(&record)?)
        .await
}

/// `!hex || hex.terrain != mountain` — absence is passable (spec §4.3).
pub fn is_hex_passable(hex: Option<&HexRecord>) -> bool {
    !matches!(hex, Some(HexRecord { terrain: Some(Terrain::Mountain), .. }))
}

pub async fn is_adjacent_to_river(kv: &dyn KvStore, game_id: &str, hex: Hex) -> CoreResult<bool> {
    for neighbor in hex.neighbors() {
        if let Some(record) = get_hex(kv, game_id, neighbor).await? {
            if record.terrain == Some(Terrain::River) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Scans every hex the player owns; true if any is adjacent to a river.
pub async fn player_has_river_access(kv: &dyn KvStore, game_id: &str, player_id: &str) -> CoreResult<bool> {
    let all = all_hexes(kv, game_id).await?;
    for (hex, record) in &all {
        if record.player_id.as_deref() == Some(player_id) && is_adjacent_to_river(kv, game_id, *hex).await? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Counts of owned tiles and each upgrade kind for a player. Keys are
/// lowercase `{banks, forts, cities}` (spec §9, open question 2 — the
/// source's `hex.upgrade + 's'` produced `citys`; normalized here).
#[derive(Debug, Default, Clone, Copy)]
pub struct UpgradeCounts {
    pub tiles: u32,
    pub banks: u32,
    pub forts: u32,
    pub cities: u32,
}

pub fn count_upgrades(hexes: &HashMap<Hex, HexRecord>, player_id: &str) -> UpgradeCounts {
    let mut counts = UpgradeCounts::default();
    for record in hexes.values() {
        if record.player_id.as_deref() != Some(player_id) {
            continue;
        }
        counts.tiles += 1;
        match record.upgrade {
            Some(Upgrade::Bank) => counts.banks += 1,
            Some(Upgrade::Fort) => counts.forts += 1,
            Some(Upgrade::City) => counts.cities += 1,
            None => {}
        }
    }
    counts
}

/// Single source of truth for a player's points cap: `startingMaxPoints +
/// 50*banks + 5*tiles` (spec §4.3).
pub async fn calculate_max_points(
    kv: &dyn KvStore,
    game_id: &str,
    player_id: &str,
    starting_max_points: i64,
) -> CoreResult<i64> {
    let all = all_hexes(kv, game_id).await?;
    let counts = count_upgrades(&all, player_id);
    Ok(starting_max_points + 50 * counts.banks as i64 + 5 * counts.tiles as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    #[tokio::test]
    async fn set_hex_does_not_preserve_upgrade() {
        let kv = MemoryKv::new();
        let hex = Hex::new(0, 0);
        set_hex(&kv, "g1", hex, Some("p1"), Some("#fff"), Some(Upgrade::Fort), None, false, 1)
            .await
            .unwrap();
        set_hex(&kv, "g1", hex, Some("p1"), Some("#fff"), None, None, false, 2)
            .await
            .unwrap();
        let record = get_hex(&kv, "g1", hex).await.unwrap().unwrap();
        assert_eq!(record.upgrade, None);
    }

    #[tokio::test]
    async fn set_hex_upgrade_preserves_owner_and_color() {
        let kv = MemoryKv::new();
        let hex = Hex::new(1, 1);
        set_hex(&kv, "g1", hex, Some("p1"), Some("#abc"), None, None, false, 1)
            .await
            .unwrap();
        set_hex_upgrade(&kv, "g1", hex, Upgrade::Bank).await.unwrap();
        let record = get_hex(&kv, "g1", hex).await.unwrap().unwrap();
        assert_eq!(record.upgrade, Some(Upgrade::Bank));
        assert_eq!(record.player_id.as_deref(), Some("p1"));
        assert_eq!(record.color.as_deref(), Some("#abc"));
    }

    #[tokio::test]
    async fn mountain_hexes_are_impassable_everything_else_is() {
        let kv = MemoryKv::new();
        let mountain = Hex::new(2, 2);
        set_hex(&kv, "g1", mountain, None, None, None, Some(Terrain::Mountain), false, 0)
            .await
            .unwrap();
        let record = get_hex(&kv, "g1", mountain).await.unwrap();
        assert!(!is_hex_passable(record.as_ref()));
        assert!(is_hex_passable(None));
        assert!(is_hex_passable(get_hex(&kv, "g1", Hex::new(99, 99)).await.unwrap().as_ref()));
    }

    #[tokio::test]
    async fn max_points_grows_with_banks_and_tiles() {
        let kv = MemoryKv::new();
        for i in 0..4 {
            set_hex(&kv, "g1", Hex::new(i, 0), Some("p1"), Some("#fff"), None, None, false, 0)
                .await
                .unwrap();
        }
        set_hex_upgrade(&kv, "g1", Hex::new(0, 0), Upgrade::Bank).await.unwrap();
        let max_points = calculate_max_points(&kv, "g1", "p1", 200).await.unwrap();
        assert_eq!(max_points, 200 + 50 + 5 * 4);
    }
}
