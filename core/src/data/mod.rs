//! The Game Data Layer (spec §4.3): persistent domain operations over
//! players, lobbies, games, hexes, points, and events. Each submodule owns
//! one key group of the KV layout in spec §6.

pub mod events;
pub mod games;
pub mod hexes;
pub mod lobbies;
pub mod players;
pub mod points;
