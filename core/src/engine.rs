//! The Game Room's simulation core (spec §4.4), expressed as KV-facade
//! functions rather than methods on a connection-bound actor so the room
//! runtime (in the `server` crate) can call them from message handlers,
//! ticks, and the auto-expansion scan alike, and so they're testable without
//! standing up a websocket.
//!
//! Every public function here corresponds to one row of spec §4.4's protocol
//! table or one of its named algorithms (cost model, start pick, auto-
//! expansion). None of them do any networking; callers turn the returned
//! outcome into `ServerMessage`s and broadcast them.

use crate::config::Settings;
use crate::cost::{capture_cost, CaptureContext, DefenderContext};
use crate::data::events::{save_game_event, EventType, GameEvent};
use crate::data::hexes::{
    all_hexes, calculate_max_points, count_upgrades, get_hex, is_hex_passable, set_hex,
    set_hex_upgrade, HexRecord,
};
use crate::data::points::{get_player_points, set_start_position, update_player_points, PlayerPoints};
use crate::error::{CoreError, CoreResult};
use crate::kv::KvStore;
use protocol::hex::Hex;
use protocol::{HexView, Terrain, Upgrade};
use std::collections::HashMap;

/// A player's points/tiles/cap, as broadcast in `pointsUpdate`.
#[derive(Debug, Clone)]
pub struct PointsSnapshot {
    pub player_id: String,
    pub points: i64,
    pub tiles: u32,
    pub max_points: i64,
}

/// `requestPointsUpdate`: a player's current points/tiles/cap, computed fresh
/// from the hex hash every time (spec §4.3's "never stale" rule applies here
/// too — there is no cached snapshot to serve).
pub async fn points_snapshot(
    kv: &dyn KvStore,
    settings: &Settings,
    game_id: &str,
    player_id: &str,
) -> CoreResult<PointsSnapshot> {
    let points = get_player_points(kv, game_id, player_id, settings.starting_points, settings.starting_max_points).await?;
    let all = all_hexes(kv, game_id).await?;
    let counts = count_upgrades(&all, player_id);
    Ok(PointsSnapshot {
        player_id: player_id.to_string(),
        points: points.points,
        tiles: counts.tiles,
        max_points: points.max_points,
    })
}

fn hex_view(hex: Hex, record: &HexRecord) -> HexView {
    HexView {
        q: hex.q,
        r: hex.r,
        color: record.color.clone(),
        crown: record.is_start,
        upgrade: record.upgrade,
        terrain: record.terrain,
    }
}

/// Outcome of a successful capture (click, batch entry, or auto-expansion).
pub struct CaptureOutcome {
    pub view: HexView,
    pub attacker: PointsSnapshot,
    /// Present only when ownership was transferred away from another player.
    pub previous_owner: Option<PointsSnapshot>,
}

/// Outcome of a `clickHex`/`fillHex` attempt, distinguishing the owned-tile
/// shortcut (spec §4.4 step 3) from an actual capture.
pub enum ClickOutcome {
    OwnedMenu { upgrade: Option<Upgrade> },
    Captured(CaptureOutcome),
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Start pick (spec §4.4 "Start pick"). The caller is responsible for
/// checking the wall-clock start window before calling this — boundary
/// behavior ("exactly at deadline accepted, one ms later rejected") lives at
/// that call site, not here, since it needs the room's clock reference.
pub async fn choose_start(
    kv: &dyn KvStore,
    settings: &Settings,
    game_id: &str,
    player_id: &str,
    color: &str,
    target: Hex,
) -> CoreResult<HexView> {
    let existing = get_hex(kv, game_id, target).await?;
    if !is_hex_passable(existing.as_ref()) {
        return Err(CoreError::PreconditionFailed("impassable"));
    }
    if existing.as_ref().map(|h| h.player_id.is_some()).unwrap_or(false) {
        return Err(CoreError::PreconditionFailed("not_adjacent"));
    }

    let now = now_ms();
    set_hex(kv, game_id, target, Some(player_id), Some(color), None, existing.and_then(|h| h.terrain), true, now)
        .await?;
    set_start_position(kv, game_id, player_id, target.q, target.r, settings.starting_points, settings.starting_max_points).await?;
    save_game_event(
        kv,
        &GameEvent {
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            color: color.to_string(),
            q: target.q,
            r: target.r,
            event_type: EventType::Start,
            timestamp: now,
        },
        settings.event_log_cap,
    )
    .await?;

    let record = get_hex(kv, game_id, target).await?.expect("just written");
    Ok(hex_view(target, &record))
}

/// `requestHoverCost`: the same number the server will later charge, or
/// `None` if the target cannot be captured at all right now.
pub async fn hover_cost(
    kv: &dyn KvStore,
    settings: &Settings,
    game_id: &str,
    player_id: &str,
    target: Hex,
) -> CoreResult<Option<i64>> {
    let existing = get_hex(kv, game_id, target).await?;
    if !is_hex_passable(existing.as_ref()) {
        return Ok(None);
    }
    if existing.as_ref().and_then(|h| h.player_id.as_deref()) == Some(player_id) {
        return Ok(None);
    }
    resolve_cost(kv, settings, game_id, player_id, target, existing.as_ref()).await
}

async fn resolve_cost(
    kv: &dyn KvStore,
    settings: &Settings,
    game_id: &str,
    player_id: &str,
    target: Hex,
    existing: Option<&HexRecord>,
) -> CoreResult<Option<i64>> {
    if existing.and_then(|h| h.player_id.as_deref()) == Some(player_id) {
        return Ok(None);
    }

    let all = all_hexes(kv, game_id).await?;
    let attacker_tiles = count_upgrades(&all, player_id).tiles;
    let target_has_river_access = is_river_adjacent(&all, target);
    let attacker_has_river_access = player_river_access(&all, player_id);

    let defender = match existing.and_then(|h| h.player_id.clone()) {
        Some(defender_id) => {
            let defender_points = get_player_points(kv, game_id, &defender_id, settings.starting_points, settings.starting_max_points).await?;
            let defender_tiles = count_upgrades(&all, &defender_id).tiles;
            Some(DefenderContext {
                tiles: defender_tiles,
                points: defender_points.points,
                fort_on_target_or_neighbor: fort_protects(&all, target, &defender_id),
            })
        }
        None => None,
    };

    let ctx = CaptureContext {
        attacker_tiles,
        target_has_river_access,
        attacker_has_river_access,
        defender,
    };
    Ok(Some(capture_cost(settings, &ctx)))
}

fn is_river_adjacent(all: &HashMap<Hex, HexRecord>, target: Hex) -> bool {
    target
        .neighbors()
        .iter()
        .any(|n| all.get(n).map(|h| h.terrain == Some(Terrain::River)).unwrap_or(false))
}

fn player_river_access(all: &HashMap<Hex, HexRecord>, player_id: &str) -> bool {
    all.iter()
        .filter(|(_, rec)| rec.player_id.as_deref() == Some(player_id))
        .any(|(hex, _)| is_river_adjacent(all, *hex))
}

/// A fort protects `target` for `owner` if the target itself carries a fort
/// owned by `owner`, or if any of its six neighbors does (spec §4.4 step 7 /
/// the direct-click doubling rule).
fn fort_protects(all: &HashMap<Hex, HexRecord>, target: Hex, owner: &str) -> bool {
    let holds_fort = |rec: &HexRecord| rec.upgrade == Some(Upgrade::Fort) && rec.player_id.as_deref() == Some(owner);
    if all.get(&target).map(holds_fort).unwrap_or(false) {
        return true;
    }
    target.neighbors().iter().any(|n| all.get(n).map(holds_fort).unwrap_or(false))
}

/// Auto-expansion fort protection (spec §4.4 step 7): applies to every
/// candidate, owned or unowned, after the allow-capture check. Blocks the
/// flip if `target` or any of its neighbors carries a fort owned by anyone
/// other than `max_player` — not just the current defender's forts.
fn enemy_fort_protects(all: &HashMap<Hex, HexRecord>, target: Hex, max_player: &str) -> bool {
    let holds_enemy_fort =
        |rec: &HexRecord| rec.upgrade == Some(Upgrade::Fort) && rec.player_id.as_deref().map(|p| p != max_player).unwrap_or(false);
    if all.get(&target).map(holds_enemy_fort).unwrap_or(false) {
        return true;
    }
    target.neighbors().iter().any(|n| all.get(n).map(holds_enemy_fort).unwrap_or(false))
}

fn attacker_is_adjacent_or_unclaimed(all: &HashMap<Hex, HexRecord>, player_id: &str, target: Hex, river_ok: bool) -> bool {
    let has_any_tile = all.values().any(|r| r.player_id.as_deref() == Some(player_id));
    if !has_any_tile {
        return true;
    }
    if river_ok {
        return true;
    }
    target
        .neighbors()
        .iter()
        .any(|n| all.get(n).map(|h| h.player_id.as_deref() == Some(player_id)).unwrap_or(false))
}

/// Single-hex capture engine shared by `clickHex`, `fillHex`, and each entry
/// of `batchFillHex`. `check_adjacency` and `owned_tile_shortcut` are the two
/// axes spec §4.4 says distinguish the click path from the drag/batch path.
pub async fn attempt_capture(
    kv: &dyn KvStore,
    settings: &Settings,
    game_id: &str,
    player_id: &str,
    color: &str,
    target: Hex,
    check_adjacency: bool,
    owned_tile_shortcut: bool,
) -> CoreResult<ClickOutcome> {
    let existing = get_hex(kv, game_id, target).await?;

    if !is_hex_passable(existing.as_ref()) {
        return Err(CoreError::PreconditionFailed("impassable"));
    }

    if owned_tile_shortcut && existing.as_ref().and_then(|h| h.player_id.as_deref()) == Some(player_id) {
        return Ok(ClickOutcome::OwnedMenu { upgrade: existing.and_then(|h| h.upgrade) });
    }

    let all = all_hexes(kv, game_id).await?;
    let attacker_has_river_access = player_river_access(&all, player_id);
    let target_river_access = is_river_adjacent(&all, target);

    let cost = resolve_cost(kv, settings, game_id, player_id, target, existing.as_ref()).await?;
    let Some(cost) = cost else {
        return Err(CoreError::PreconditionFailed("insufficient"));
    };

    let attacker_points = get_player_points(kv, game_id, player_id, settings.starting_points, settings.starting_max_points).await?;
    if attacker_points.points < cost {
        return Err(CoreError::PreconditionFailed("insufficient"));
    }

    if check_adjacency
        && !attacker_is_adjacent_or_unclaimed(&all, player_id, target, target_river_access && attacker_has_river_access)
    {
        return Err(CoreError::PreconditionFailed("not_adjacent"));
    }

    let previous_owner = existing.as_ref().and_then(|h| h.player_id.clone());
    let now = now_ms();

    update_player_points(kv, game_id, player_id, attacker_points.points - cost, settings.starting_max_points).await?;
    set_hex(
        kv,
        game_id,
        target,
        Some(player_id),
        Some(color),
        None,
        existing.and_then(|h| h.terrain),
        false,
        now,
    )
    .await?;
    save_game_event(
        kv,
        &GameEvent {
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            color: color.to_string(),
            q: target.q,
            r: target.r,
            event_type: EventType::Capture,
            timestamp: now,
        },
        settings.event_log_cap,
    )
    .await?;

    let record = get_hex(kv, game_id, target).await?.expect("just written");
    let attacker_snapshot = points_snapshot(kv, settings, game_id, player_id).await?;
    let previous_owner_snapshot = match previous_owner {
        Some(ref prev) if prev != player_id => Some(points_snapshot(kv, settings, game_id, prev).await?),
        _ => None,
    };

    Ok(ClickOutcome::Captured(CaptureOutcome {
        view: hex_view(target, &record),
        attacker: attacker_snapshot,
        previous_owner: previous_owner_snapshot,
    }))
}

/// Outcome of a single `upgradeHex` / `batchUpgradeHex` entry.
pub struct UpgradeOutcome {
    pub view: HexView,
    pub owner: PointsSnapshot,
}

pub fn upgrade_cost(settings: &Settings, upgrade: Upgrade) -> i64 {
    match upgrade {
        Upgrade::Bank => settings.upgrade_bank_cost,
        Upgrade::Fort => settings.upgrade_fort_cost,
        Upgrade::City => settings.upgrade_city_cost,
    }
}

pub async fn purchase_upgrade(
    kv: &dyn KvStore,
    settings: &Settings,
    game_id: &str,
    player_id: &str,
    target: Hex,
    upgrade: Upgrade,
) -> CoreResult<UpgradeOutcome> {
    let existing = get_hex(kv, game_id, target).await?;
    if existing.as_ref().and_then(|h| h.player_id.as_deref()) != Some(player_id) {
        return Err(CoreError::PreconditionFailed("not_owner"));
    }

    let cost = upgrade_cost(settings, upgrade);
    let points = get_player_points(kv, game_id, player_id, settings.starting_points, settings.starting_max_points).await?;
    if points.points < cost {
        return Err(CoreError::PreconditionFailed("insufficient"));
    }

    set_hex_upgrade(kv, game_id, target, upgrade).await?;
    update_player_points(kv, game_id, player_id, points.points - cost, settings.starting_max_points).await?;
    save_game_event(
        kv,
        &GameEvent {
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            color: existing.and_then(|h| h.color).unwrap_or_default(),
            q: target.q,
            r: target.r,
            event_type: EventType::Upgrade,
            timestamp: now_ms(),
        },
        settings.event_log_cap,
    )
    .await?;

    let record = get_hex(kv, game_id, target).await?.expect("just written");
    let owner = points_snapshot(kv, settings, game_id, player_id).await?;
    Ok(UpgradeOutcome { view: hex_view(target, &record), owner })
}

/// The 1-second economy tick (spec §4.4 "Economy tick"). No broadcast is
/// produced — clients poll `requestPointsUpdate` (spec §9 open question 3).
pub async fn economy_tick(kv: &dyn KvStore, settings: &Settings, game_id: &str, player_id: &str) -> CoreResult<()> {
    let current = get_player_points(kv, game_id, player_id, settings.starting_points, settings.starting_max_points).await?;
    let next = (current.points + settings.base_income).min(current.max_points);
    if next != current.points {
        update_player_points(kv, game_id, player_id, next, settings.starting_max_points).await?;
    }
    Ok(())
}

/// A single auto-expansion capture applied after the scan (spec §4.4
/// "Auto-expansion" step 9).
pub struct AutoCapture {
    pub view: HexView,
    pub new_owner: PointsSnapshot,
    pub previous_owner: Option<PointsSnapshot>,
}

/// Runs one auto-expansion scan: builds the neighbor-owner histogram over
/// every candidate cell, decides which captures the majority rule allows,
/// then applies them (snapshot-then-mutate, spec §4.4 step 9). Colors are
/// looked up from each majority player's own most recently captured tile so
/// the auto-captured hex renders in the correct color without a separate
/// player registry round-trip.
pub async fn run_auto_expansion(
    kv: &dyn KvStore,
    settings: &Settings,
    game_id: &str,
) -> CoreResult<Vec<AutoCapture>> {
    let all = all_hexes(kv, game_id).await?;
    let mut candidates: HashMap<Hex, ()> = HashMap::new();
    for hex in all.keys() {
        candidates.insert(*hex, ());
        for n in hex.neighbors() {
            candidates.insert(n, ());
        }
    }

    let mut player_color: HashMap<String, String> = HashMap::new();
    for record in all.values() {
        if let (Some(pid), Some(color)) = (&record.player_id, &record.color) {
            player_color.entry(pid.clone()).or_insert_with(|| color.clone());
        }
    }

    let mut planned: Vec<(Hex, String)> = Vec::new();

    for target in candidates.keys().copied() {
        let existing = all.get(&target);
        if !is_hex_passable(existing) {
            continue;
        }

        let mut histogram: HashMap<&str, u32> = HashMap::new();
        for n in target.neighbors() {
            if let Some(owner) = all.get(&n).and_then(|h| h.player_id.as_deref()) {
                *histogram.entry(owner).or_insert(0) += 1;
            }
        }
        let Some((max_player, max_count)) = strict_majority(&histogram) else {
            continue;
        };
        if max_count < settings.auto_capture_threshold {
            continue;
        }

        let current_owner = existing.and_then(|h| h.player_id.as_deref());
        if current_owner == Some(max_player) {
            continue;
        }

        if current_owner.is_some() {
            let fully_enclosed = target
                .neighbors()
                .iter()
                .all(|n| all.get(n).and_then(|h| h.player_id.as_deref()) == Some(max_player));
            let river_override = is_river_adjacent(&all, target) && player_river_access(&all, max_player);
            if !(fully_enclosed || river_override) {
                continue;
            }
        }

        if enemy_fort_protects(&all, target, max_player) {
            continue;
        }

        planned.push((target, max_player.to_string()));
    }

    let mut outcomes = Vec::with_capacity(planned.len());
    for (target, new_owner) in planned {
        let color = player_color.get(&new_owner).cloned().unwrap_or_else(|| "#cccccc".to_string());
        let existing = get_hex(kv, game_id, target).await?;
        let previous_owner_id = existing.as_ref().and_then(|h| h.player_id.clone());
        let now = now_ms();

        set_hex(
            kv,
            game_id,
            target,
            Some(&new_owner),
            Some(&color),
            None,
            existing.and_then(|h| h.terrain),
            false,
            now,
        )
        .await?;
        save_game_event(
            kv,
            &GameEvent {
                game_id: game_id.to_string(),
                player_id: new_owner.clone(),
                color: color.clone(),
                q: target.q,
                r: target.r,
                event_type: EventType::AutoCapture,
                timestamp: now,
            },
            settings.event_log_cap,
        )
        .await?;

        let record = get_hex(kv, game_id, target).await?.expect("just written");
        let new_owner_snapshot = points_snapshot(kv, settings, game_id, &new_owner).await?;
        let previous_owner_snapshot = match previous_owner_id {
            Some(ref prev) if *prev != new_owner => Some(points_snapshot(kv, settings, game_id, prev).await?),
            _ => None,
        };

        outcomes.push(AutoCapture {
            view: hex_view(target, &record),
            new_owner: new_owner_snapshot,
            previous_owner: previous_owner_snapshot,
        });
    }

    Ok(outcomes)
}

/// Strict majority only: ties produce `None` (spec §4.4 "Tie-breaking").
fn strict_majority<'a>(histogram: &HashMap<&'a str, u32>) -> Option<(&'a str, u32)> {
    let mut best: Option<(&str, u32)> = None;
    let mut tied = false;
    for (player, count) in histogram {
        match best {
            None => best = Some((player, *count)),
            Some((_, best_count)) if *count > best_count => {
                best = Some((player, *count));
                tied = false;
            }
            Some((_, best_count)) if *count == best_count => tied = true,
            _ => {}
        }
    }
    if tied {
        None
    } else {
        best
    }
}

/// `history`: the full hex snapshot sent to a newly joined client.
pub async fn history_snapshot(kv: &dyn KvStore, game_id: &str) -> CoreResult<Vec<HexView>> {
    let all = all_hexes(kv, game_id).await?;
    Ok(all.into_iter().map(|(hex, rec)| hex_view(hex, &rec)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::hexes::set_hex as write_hex;
    use crate::kv::MemoryKv;

    async fn give_points(kv: &dyn KvStore, game_id: &str, player_id: &str, points: i64, settings: &Settings) {
        update_player_points(kv, game_id, player_id, points, settings.starting_max_points).await.unwrap();
    }

    #[tokio::test]
    async fn owned_tile_click_opens_menu_without_charging() {
        let kv = MemoryKv::new();
        let settings = Settings::default();
        write_hex(&kv, "g1", Hex::new(0, 0), Some("p1"), Some("#fff"), Some(Upgrade::Bank), None, true, 0)
            .await
            .unwrap();
        give_points(&kv, "g1", "p1", 200, &settings).await;

        let outcome = attempt_capture(&kv, &settings, "g1", "p1", "#fff", Hex::new(0, 0), true, true)
            .await
            .unwrap();
        assert!(matches!(outcome, ClickOutcome::OwnedMenu { upgrade: Some(Upgrade::Bank) }));
        let points = get_player_points(&kv, "g1", "p1", 200, 200).await.unwrap();
        assert_eq!(points.points, 200);
    }

    #[tokio::test]
    async fn capture_debits_exactly_the_hover_cost() {
        let kv = MemoryKv::new();
        let settings = Settings::default();
        write_hex(&kv, "g1", Hex::new(0, 0), Some("p1"), Some("#fff"), None, None, true, 0)
            .await
            .unwrap();
        give_points(&kv, "g1", "p1", 200, &settings).await;

        let cost = hover_cost(&kv, &settings, "g1", "p1", Hex::new(1, 0)).await.unwrap().unwrap();
        let outcome = attempt_capture(&kv, &settings, "g1", "p1", "#fff", Hex::new(1, 0), true, true)
            .await
            .unwrap();
        let ClickOutcome::Captured(captured) = outcome else { panic!("expected capture") };
        assert_eq!(captured.attacker.points, 200 - cost);
    }

    #[tokio::test]
    async fn non_adjacent_click_is_rejected() {
        let kv = MemoryKv::new();
        let settings = Settings::default();
        write_hex(&kv, "g1", Hex::new(0, 0), Some("p1"), Some("#fff"), None, None, true, 0)
            .await
            .unwrap();
        give_points(&kv, "g1", "p1", 200, &settings).await;

        let err = attempt_capture(&kv, &settings, "g1", "p1", "#fff", Hex::new(50, 50), true, true)
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::PreconditionFailed("not_adjacent"));
    }

    #[tokio::test]
    async fn mountain_targets_are_always_rejected() {
        let kv = MemoryKv::new();
        let settings = Settings::default();
        write_hex(&kv, "g1", Hex::new(1, 0), None, None, None, Some(Terrain::Mountain), false, 0)
            .await
            .unwrap();
        let err = attempt_capture(&kv, &settings, "g1", "p1", "#fff", Hex::new(1, 0), true, true)
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::PreconditionFailed("impassable"));
    }

    #[tokio::test]
    async fn auto_expansion_needs_a_strict_majority_of_at_least_three() {
        let kv = MemoryKv::new();
        let settings = Settings::default();
        // Two neighbors of A, one of B around the origin: no strict majority >= 3.
        write_hex(&kv, "g1", Hex::new(1, 0), Some("a"), Some("#a"), None, None, false, 0).await.unwrap();
        write_hex(&kv, "g1", Hex::new(1, -1), Some("a"), Some("#a"), None, None, false, 0).await.unwrap();
        write_hex(&kv, "g1", Hex::new(0, -1), Some("b"), Some("#b"), None, None, false, 0).await.unwrap();
        let captures = run_auto_expansion(&kv, &settings, "g1").await.unwrap();
        assert!(captures.iter().all(|c| c.view.q != 0 || c.view.r != 0));
    }

    #[tokio::test]
    async fn auto_expansion_captures_with_three_matching_neighbors() {
        let kv = MemoryKv::new();
        let settings = Settings::default();
        write_hex(&kv, "g1", Hex::new(1, 0), Some("a"), Some("#a"), None, None, false, 0).await.unwrap();
        write_hex(&kv, "g1", Hex::new(1, -1), Some("a"), Some("#a"), None, None, false, 0).await.unwrap();
        write_hex(&kv, "g1", Hex::new(0, -1), Some("a"), Some("#a"), None, None, false, 0).await.unwrap();
        let captures = run_auto_expansion(&kv, &settings, "g1").await.unwrap();
        assert!(captures.iter().any(|c| c.view.q == 0 && c.view.r == 0 && c.new_owner.player_id == "a"));
    }

    #[tokio::test]
    async fn fort_protects_an_owned_hex_from_auto_capture() {
        let kv = MemoryKv::new();
        let settings = Settings::default();
        write_hex(&kv, "g1", Hex::new(0, 0), Some("b"), Some("#b"), Some(Upgrade::Fort), None, false, 0).await.unwrap();
        for n in Hex::new(0, 0).neighbors() {
            write_hex(&kv, "g1", n, Some("a"), Some("#a"), None, None, false, 0).await.unwrap();
        }
        let captures = run_auto_expansion(&kv, &settings, "g1").await.unwrap();
        assert!(captures.iter().all(|c| !(c.view.q == 0 && c.view.r == 0)));
    }

    #[tokio::test]
    async fn auto_expansion_needs_full_encirclement_to_flip_an_owned_hex() {
        let kv = MemoryKv::new();
        let settings = Settings::default();
        write_hex(&kv, "g1", Hex::new(0, 0), Some("b"), Some("#b"), None, None, false, 0).await.unwrap();
        let neighbors = Hex::new(0, 0).neighbors();
        for n in &neighbors[..3] {
            write_hex(&kv, "g1", *n, Some("a"), Some("#a"), None, None, false, 0).await.unwrap();
        }
        let captures = run_auto_expansion(&kv, &settings, "g1").await.unwrap();
        assert!(captures.iter().all(|c| !(c.view.q == 0 && c.view.r == 0)));
    }

    #[tokio::test]
    async fn fort_protects_an_unowned_hex_from_auto_capture() {
        let kv = MemoryKv::new();
        let settings = Settings::default();
        // (0,0) is unowned but one of its neighbors carries a fort owned by "b",
        // a player other than the would-be majority "a".
        let neighbors = Hex::new(0, 0).neighbors();
        write_hex(&kv, "g1", neighbors[0], Some("b"), Some("#b"), Some(Upgrade::Fort), None, false, 0)
            .await
            .unwrap();
        for n in &neighbors[1..4] {
            write_hex(&kv, "g1", *n, Some("a"), Some("#a"), None, None, false, 0).await.unwrap();
        }
        let captures = run_auto_expansion(&kv, &settings, "g1").await.unwrap();
        assert!(captures.iter().all(|c| !(c.view.q == 0 && c.view.r == 0)));
    }

    #[tokio::test]
    async fn third_party_fort_blocks_a_river_override_capture() {
        let kv = MemoryKv::new();
        let settings = Settings::default();
        let origin = Hex::new(0, 0);
        let neighbors = origin.neighbors();
        // Origin owned by "b", not fully enclosed, but adjacent to a river tile
        // that gives "a" a river-override path to a strict 3-neighbor majority.
        // A fort owned by a third player "c" sits on one of origin's neighbors.
        write_hex(&kv, "g1", origin, Some("b"), Some("#b"), None, None, false, 0).await.unwrap();
        write_hex(&kv, "g1", neighbors[0], None, None, None, Some(Terrain::River), false, 0)
            .await
            .unwrap();
        write_hex(&kv, "g1", neighbors[1], Some("a"), Some("#a"), None, None, false, 0).await.unwrap();
        write_hex(&kv, "g1", neighbors[2], Some("a"), Some("#a"), None, None, false, 0).await.unwrap();
        write_hex(&kv, "g1", neighbors[3], Some("a"), Some("#a"), None, None, false, 0).await.unwrap();
        write_hex(&kv, "g1", neighbors[4], Some("c"), Some("#c"), Some(Upgrade::Fort), None, false, 0)
            .await
            .unwrap();

        let captures = run_auto_expansion(&kv, &settings, "g1").await.unwrap();
        assert!(captures.iter().all(|c| !(c.view.q == origin.q && c.view.r == origin.r)));
    }
}
