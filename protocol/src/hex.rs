//! Axial hex coordinates and the fixed neighbor direction table (spec §4.4).

use serde::{Deserialize, Serialize};

/// The six axial neighbor directions, pointy-top layout, in the fixed order
/// the spec enumerates them. Order matters for nothing semantic, but keeping
/// it fixed makes neighbor iteration deterministic for tests and for the
/// auto-expansion histogram.
pub const HEX_NEIGHBOR_DIRS: [(i32, i32); 6] =
    [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

/// An axial coordinate pair. `s = -q - r` is always implied, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hex {
    pub q: i32,
    pub r: i32,
}

impl Hex {
    pub const fn new(q: i32, r: i32) -> Self {
        Hex { q, r }
    }

    /// The six neighbors in the fixed direction order.
    pub fn neighbors(self) -> [Hex; 6] {
        let mut out = [Hex::new(0, 0); 6];
        for (i, (dq, dr)) in HEX_NEIGHBOR_DIRS.iter().enumerate() {
            out[i] = Hex::new(self.q + dq, self.r + dr);
        }
        out
    }

    /// Key format used in the KV hash field layout: `"q:r"`.
    pub fn field_key(self) -> String {
        format!("{}:{}", self.q, self.r)
    }

    pub fn parse_field_key(key: &str) -> Option<Hex> {
        let (q_str, r_str) = key.split_once(':')?;
        let q = q_str.parse().ok()?;
        let r = r_str.parse().ok()?;
        Some(Hex::new(q, r))
    }

    pub fn is_adjacent(self, other: Hex) -> bool {
        self.neighbors().contains(&other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_key_round_trips() {
        let h = Hex::new(-3, 7);
        assert_eq!(Hex::parse_field_key(&h.field_key()), Some(h));
    }

    #[test]
    fn neighbors_are_mutually_adjacent() {
        let origin = Hex::new(0, 0);
        for n in origin.neighbors() {
            assert!(n.is_adjacent(origin));
            assert!(origin.is_adjacent(n));
        }
        assert!(!origin.is_adjacent(Hex::new(2, 0)));
    }
}
