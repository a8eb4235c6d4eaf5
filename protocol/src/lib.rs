//! Wire types shared between the server and any client.
//!
//! Unlike the relay's opaque byte frames, the game room speaks JSON: every
//! inbound and outbound message below corresponds directly to one of the
//! tables in the room protocol. Keep this crate free of any I/O — it only
//! describes shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod hex;
pub use hex::{Hex, HEX_NEIGHBOR_DIRS};

/// Upgrade kinds a hex can carry. Empty string in the data model maps to `None` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Upgrade {
    Bank,
    City,
    Fort,
}

impl Upgrade {
    pub fn as_str(self) -> &'static str {
        match self {
            Upgrade::Bank => "bank",
            Upgrade::City => "city",
            Upgrade::Fort => "fort",
        }
    }
}

impl fmt::Display for Upgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terrain kinds. Empty string in the data model maps to `None` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    Mountain,
    River,
}

/// A single hex-fill attempt, client-provided coordinate pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HexCoord {
    pub q: i32,
    pub r: i32,
}

impl From<Hex> for HexCoord {
    fn from(h: Hex) -> Self {
        HexCoord { q: h.q, r: h.r }
    }
}

/// One entry of a `batchUpgradeHex` request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpgradeRequest {
    pub q: i32,
    pub r: i32,
    #[serde(rename = "type")]
    pub upgrade_type: Upgrade,
}

/// Inbound client -> game room messages (spec §4.4 inbound table).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientMessage {
    ChooseStart { q: i32, r: i32 },
    FillHex { q: i32, r: i32 },
    BatchFillHex { hexes: Vec<HexCoord> },
    ClickHex { q: i32, r: i32 },
    UpgradeHex { q: i32, r: i32, #[serde(rename = "type")] upgrade_type: Upgrade },
    BatchUpgradeHex { hexes: Vec<UpgradeRequest> },
    RequestHoverCost { q: i32, r: i32 },
    RequestPointsUpdate,
}

/// A single hex's public state, used in `history` snapshots and `update` broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HexView {
    pub q: i32,
    pub r: i32,
    /// `None` when unowned.
    pub color: Option<String>,
    pub crown: bool,
    pub upgrade: Option<Upgrade>,
    pub terrain: Option<Terrain>,
}

/// Per-hex result of a single click/fill/upgrade attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillResult {
    pub q: i32,
    pub r: i32,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Per-hex result of one `upgradeHex` / `batchUpgradeHex` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeResult {
    pub q: i32,
    pub r: i32,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_type: Option<Upgrade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outbound game-room -> client messages (spec §4.4 outbound table).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    AssignedColor { color: String },
    History { hexes: Vec<HexView> },
    LobbyStartTime { ts: i64, start_delay_ms: u64 },
    Update(HexView),
    FillResultMsg(FillResult),
    BatchFillResult { results: Vec<FillResult> },
    BatchUpgradeResult { results: Vec<UpgradeResult> },
    OpenOwnedTileMenu { q: i32, r: i32, upgrade: Option<Upgrade> },
    HoverCost { q: i32, r: i32, cost: Option<i64> },
    PointsUpdate { player_id: String, points: i64, tiles: u32, max_points: i64 },
    UpgradeResultMsg(UpgradeResult),
}

/// Lobby room inbound messages (spec §4.5).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum LobbyClientMessage {
    JoinGame,
    CreateReplay { game_id: String },
}

/// Lobby room outbound messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum LobbyServerMessage {
    Countdown { seconds_left: u32 },
    StartGame { room_id: String },
    ReplayCreated { room_id: String },
    Roster { players: Vec<RosterEntry> },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub player_id: String,
    pub username: String,
    pub color: String,
    pub started: bool,
}

/// Replay room outbound messages (spec §4.6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ReplayServerMessage {
    ReplayInfo { game_id: String, total_events: usize },
    Event(ReplayEvent),
    ReplayEnd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEvent {
    pub game_id: String,
    pub player_id: String,
    pub color: String,
    pub q: i32,
    pub r: i32,
    pub event_type: String,
    pub timestamp: i64,
}

// ---- HTTP surface DTOs (spec §6) ----

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub player_id: String,
    pub token: String,
    pub username: String,
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColorChangeRequest {
    pub player_id: String,
    pub token: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub clicks: Vec<ReplayEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
    pub kv_available: bool,
    pub active_rooms: usize,
}

/// WebSocket join envelope sent as the first message on every room connection.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomJoinRequest {
    pub player_id: String,
    pub token: String,
}
