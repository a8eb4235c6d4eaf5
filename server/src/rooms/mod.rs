//! Room Runtime (spec §4, component D): hosts lobby/game/replay rooms as
//! single-writer actors, one `tokio` task per room with one inbound `mpsc`
//! channel, directly generalizing the teacher's per-room task-pair pattern
//! (`relay-server::message_relay`) from a dumb byte relay to a logic-owning
//! actor that speaks JSON `protocol` messages instead of raw frames.
//!
//! Every inbound websocket message and every timer firing for a room is
//! funneled through that one channel, so state mutations and broadcasts are
//! strictly ordered per spec §5. A slow client's outbound channel is a
//! bounded `mpsc` drained with `try_send`: a full buffer means the frame is
//! dropped, never that the room blocks (spec §5 "must not stall its room").

pub mod game;
pub mod lobby;
pub mod replay;

use tokio::sync::mpsc;

/// Per-connection session identity. Freshly generated on every join,
/// including reconnects — the old session's outbound channel is simply
/// dropped, closing that websocket's send loop.
pub type SessionId = u64;

/// Capacity of a single client's outbound queue. Generous enough to absorb
/// a burst of `update`s from one capture plus a `pointsUpdate`, small enough
/// that a genuinely stalled client falls behind fast rather than piling up
/// unbounded memory.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 128;

/// A bounded, non-blocking fan-out target for one connected client. Room
/// actors hold one of these per session; sending never awaits or panics,
/// matching spec §5's "drop frames to a slow client, never block the room".
/// Generic over each room's own outbound message enum (`ServerMessage`,
/// `LobbyServerMessage`, `ReplayServerMessage`).
#[derive(Clone)]
pub struct Outbox<M> {
    tx: mpsc::Sender<M>,
}

impl<M> Outbox<M> {
    pub fn new(tx: mpsc::Sender<M>) -> Self {
        Outbox { tx }
    }

    /// Best-effort delivery. Returns `false` if the channel is full or the
    /// client already disconnected; callers log at `debug`, never treat it
    /// as a room-fatal error.
    pub fn send(&self, message: M) -> bool {
        self.tx.try_send(message).is_ok()
    }
}

/// Monotonic session id allocator shared process-wide; collisions across
/// rooms are harmless since ids are only ever looked up within their own
/// room's session map.
pub fn next_session_id() -> SessionId {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
