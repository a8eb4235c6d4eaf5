//! Terrain generation (spec §4.4 "Terrain generation"). Run once at game
//! creation; a pure function of a seed (spec §9: the source doesn't expose
//! one, so replaying a game's event log against freshly generated terrain
//! with the same seed reproduces geography — the seed is stored on the
//! `Game` record, see `core::data::games::GameRecord::terrain_seed`).

use crate::config::Settings;
use protocol::hex::{Hex, HEX_NEIGHBOR_DIRS};
use protocol::Terrain;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// A non-reversing direction index: any of the six except the one pointing
/// back the way a chain just came from.
fn non_reverse_direction(rng: &mut StdRng, came_from: usize) -> usize {
    let reverse = (came_from + 3) % 6;
    loop {
        let candidate = rng.gen_range(0..6);
        if candidate != reverse {
            return candidate;
        }
    }
}

/// Generates mountain chains and river systems for a fresh game, seeded so
/// the result is reproducible. Returns a map of hex -> terrain; hexes not
/// present are plain (unclaimed-but-untyped) land.
pub fn generate_terrain(settings: &Settings, seed: u64) -> HashMap<Hex, Terrain> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut terrain = HashMap::new();

    generate_mountains(settings, &mut rng, &mut terrain);
    generate_rivers(settings, &mut rng, &mut terrain);

    terrain
}

fn generate_mountains(settings: &Settings, rng: &mut StdRng, terrain: &mut HashMap<Hex, Terrain>) {
    let chain_count =
        rng.gen_range(settings.mountain_chains_min..=settings.mountain_chains_max.max(settings.mountain_chains_min));
    let half = settings.mountain_area_size / 2;
    let mut seeds: Vec<Hex> = Vec::new();

    'seeds: for _ in 0..chain_count {
        for _attempt in 0..50 {
            let q = rng.gen_range(-half..=half);
            let r = rng.gen_range(-half..=half);
            let candidate = Hex::new(q, r);
            if seeds.iter().all(|s| axial_distance(*s, candidate) >= settings.mountain_chain_spacing) {
                seeds.push(candidate);
                continue 'seeds;
            }
        }
    }

    for seed in seeds {
        let length =
            rng.gen_range(settings.mountain_chain_length_min..=settings.mountain_chain_length_max.max(settings.mountain_chain_length_min));
        let mut direction = rng.gen_range(0..6usize);
        let mut current = seed;
        for _ in 0..length {
            terrain.insert(current, Terrain::Mountain);

            if rng.gen_bool(settings.mountain_density.clamp(0.0, 1.0)) {
                let (bq, br) = HEX_NEIGHBOR_DIRS[rng.gen_range(0..6)];
                terrain.insert(Hex::new(current.q + bq, current.r + br), Terrain::Mountain);
            }

            if rng.gen_bool(settings.mountain_zigzag_chance.clamp(0.0, 1.0)) {
                direction = non_reverse_direction(rng, direction);
            }
            let (dq, dr) = HEX_NEIGHBOR_DIRS[direction];
            current = Hex::new(current.q + dq, current.r + dr);
        }
    }
}

fn generate_rivers(settings: &Settings, rng: &mut StdRng, terrain: &mut HashMap<Hex, Terrain>) {
    let half = settings.mountain_area_size / 2;
    let mut seeds: Vec<Hex> = Vec::new();

    'seeds: for _ in 0..settings.river_count {
        for _attempt in 0..50 {
            let q = rng.gen_range(-half..=half);
            let r = rng.gen_range(-half..=half);
            let candidate = Hex::new(q, r);
            if seeds.iter().all(|s| axial_distance(*s, candidate) >= settings.river_min_spacing) {
                seeds.push(candidate);
                continue 'seeds;
            }
        }
    }

    for seed in seeds {
        let mut direction = rng.gen_range(0..6usize);
        let mut current = seed;
        let fork_point = settings.river_length / 3;
        let mut forked = false;

        for step in 0..settings.river_length {
            if matches!(terrain.get(&current), Some(Terrain::Mountain)) {
                // Rivers never overwrite mountains; the chain simply continues past the cell.
            } else {
                terrain.insert(current, Terrain::River);
            }

            if !forked && step >= fork_point && rng.gen_bool(settings.river_fork_chance.clamp(0.0, 1.0)) {
                forked = true;
                spawn_river_fork(settings, rng, current, direction, terrain);
            }

            direction = non_reverse_direction(rng, direction);
            let (dq, dr) = HEX_NEIGHBOR_DIRS[direction];
            current = Hex::new(current.q + dq, current.r + dr);
        }
    }
}

fn spawn_river_fork(
    settings: &Settings,
    rng: &mut StdRng,
    from: Hex,
    parent_direction: usize,
    terrain: &mut HashMap<Hex, Terrain>,
) {
    let mut direction = non_reverse_direction(rng, parent_direction);
    let mut current = from;
    for _ in 0..settings.river_fork_length {
        let (dq, dr) = HEX_NEIGHBOR_DIRS[direction];
        current = Hex::new(current.q + dq, current.r + dr);
        if !matches!(terrain.get(&current), Some(Terrain::Mountain)) {
            terrain.insert(current, Terrain::River);
        }
        if rng.gen_bool(0.2) {
            direction = non_reverse_direction(rng, direction);
        }
    }
}

fn axial_distance(a: Hex, b: Hex) -> i32 {
    let dq = a.q - b.q;
    let dr = a.r - b.r;
    ((dq.abs() + dr.abs() + (dq + dr).abs()) / 2).max(dq.abs()).max(dr.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_a_pure_function_of_its_seed() {
        let settings = Settings::default();
        let a = generate_terrain(&settings, 42);
        let b = generate_terrain(&settings, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_usually_produce_different_maps() {
        let settings = Settings::default();
        let a = generate_terrain(&settings, 1);
        let b = generate_terrain(&settings, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn produces_both_mountains_and_rivers() {
        let settings = Settings::default();
        let terrain = generate_terrain(&settings, 7);
        assert!(terrain.values().any(|t| *t == Terrain::Mountain));
        assert!(terrain.values().any(|t| *t == Terrain::River));
    }
}
