//! The Game Data Layer, KV Store Facade, Identity & Auth, cost model, and
//! terrain generation (spec §4.1–§4.4, §9). Pure functions of the [`KvStore`]
//! facade trait; no networking. The `server` crate wires these into room
//! actors, timers, and the HTTP surface.

pub mod auth;
pub mod config;
pub mod cost;
pub mod data;
pub mod engine;
pub mod error;
pub mod kv;
pub mod kv_redis;
pub mod terrain;

pub use error::{CoreError, CoreResult};
