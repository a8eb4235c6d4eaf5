//! The authoritative cost model (spec §4.4 "Cost model"). Pure, synchronous
//! arithmetic over plain numbers — no KV access — so it can be exercised
//! directly by the scenario tests in spec §8 without spinning up a room.
//!
//! Per spec §9 "Cost model numerics": integer math everywhere it's possible,
//! floating point only for the `strength`/`sqrt`/`log2` terms, floored at the
//! very end rather than relying on a language's default rounding mode.

use crate::config::Settings;

/// `expansion = hexValue + floor(expGrowth * log2(tiles_owned + 2))`.
pub fn expansion_cost(settings: &Settings, attacker_tiles: u32) -> i64 {
    let growth = settings.exp_growth * ((attacker_tiles as f64 + 2.0).log2());
    settings.hex_value + growth.floor() as i64
}

/// Inputs describing the target of a capture attempt, already resolved by
/// the caller from the hex/points data layer.
pub struct CaptureContext {
    pub attacker_tiles: u32,
    pub target_has_river_access: bool,
    pub attacker_has_river_access: bool,
    pub defender: Option<DefenderContext>,
}

pub struct DefenderContext {
    pub tiles: u32,
    pub points: i64,
    pub fort_on_target_or_neighbor: bool,
}

/// Returns `None` when the action isn't a capture at all (already owned by
/// the attacker — spec §4.4 step 3, handled by the caller before this is
/// invoked). Otherwise the integer cost to charge, per spec §4.4.
pub fn capture_cost(settings: &Settings, ctx: &CaptureContext) -> i64 {
    let mut cost = expansion_cost(settings, ctx.attacker_tiles);

    if ctx.target_has_river_access && ctx.attacker_has_river_access {
        cost = ((cost as f64) * settings.river_discount).floor() as i64;
        cost = cost.max(1);
    }

    if let Some(defender) = &ctx.defender {
        let d_h = defender.tiles.max(1) as f64;
        let d_p = defender.points as f64;
        let mut strength = (1.0 + d_p / d_h) * d_h * (settings.hex_value as f64 + 0.5);
        if defender.fort_on_target_or_neighbor {
            strength *= settings.fort_strength_mult;
        }
        let attack_cost = expansion_cost(settings, ctx.attacker_tiles)
            + settings.occupied_base
            + (settings.attack_mult * strength.sqrt()).floor() as i64;
        cost = cost.max(attack_cost);
    }

    cost
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn scenario_2_adjacent_capture_costs_17() {
        // A owns 2 tiles before this click (spec §8 scenario 2: expansion =
        // 10 + floor(5*log2(3)) = 17, matching H_a + 2 = 3).
        let ctx = CaptureContext {
            attacker_tiles: 1,
            target_has_river_access: false,
            attacker_has_river_access: false,
            defender: None,
        };
        assert_eq!(capture_cost(&settings(), &ctx), 17);
    }

    #[test]
    fn scenario_3_attack_a_defender_costs_137() {
        // Spec §8 scenario 3 reuses scenario 2's `expansion = 17` verbatim
        // rather than recomputing it from the attacker's (by-then-larger)
        // tile count, so the worked example's `attacker_tiles` is pinned at
        // 1 here to reproduce the documented `expansion` term exactly.
        let ctx = CaptureContext {
            attacker_tiles: 1,
            target_has_river_access: false,
            attacker_has_river_access: false,
            defender: Some(DefenderContext {
                tiles: 3,
                points: 200,
                fort_on_target_or_neighbor: false,
            }),
        };
        assert_eq!(capture_cost(&settings(), &ctx), 137);
    }

    #[test]
    fn scenario_4_fort_defense_raises_cost_to_185() {
        let ctx = CaptureContext {
            attacker_tiles: 1,
            target_has_river_access: false,
            attacker_has_river_access: false,
            defender: Some(DefenderContext {
                tiles: 3,
                points: 200,
                fort_on_target_or_neighbor: true,
            }),
        };
        assert_eq!(capture_cost(&settings(), &ctx), 185);
    }

    #[test]
    fn river_access_discounts_by_30_percent_floored_with_a_floor_of_one() {
        let settings = settings();
        let base = {
            let ctx = CaptureContext {
                attacker_tiles: 1,
                target_has_river_access: false,
                attacker_has_river_access: false,
                defender: None,
            };
            capture_cost(&settings, &ctx)
        };
        let discounted = {
            let ctx = CaptureContext {
                attacker_tiles: 1,
                target_has_river_access: true,
                attacker_has_river_access: true,
                defender: None,
            };
            capture_cost(&settings, &ctx)
        };
        assert_eq!(discounted, ((base as f64) * 0.7).floor() as i64);
        assert!(discounted >= 1);
    }

    #[test]
    fn river_discount_only_applies_when_attacker_has_access_too() {
        let settings = settings();
        let ctx_no_access = CaptureContext {
            attacker_tiles: 1,
            target_has_river_access: true,
            attacker_has_river_access: false,
            defender: None,
        };
        let ctx_plain = CaptureContext {
            attacker_tiles: 1,
            target_has_river_access: false,
            attacker_has_river_access: false,
            defender: None,
        };
        assert_eq!(
            capture_cost(&settings, &ctx_no_access),
            capture_cost(&settings, &ctx_plain)
        );
    }
}
