//! The error taxonomy of spec §7, realized as a single enum so every layer
//! (data layer, room actors, HTTP handlers) propagates with `?` and maps the
//! variant to its documented behavior at the boundary.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Client-supplied input fails validation; no state change, surfaced verbatim.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Missing/invalid token, or an `allowedPlayerIds` violation.
    #[error("authentication failed")]
    AuthFailed,

    /// Unknown player, game, lobby, or room. Hex lookups model absence as
    /// `Option::None`, not this variant — see spec §7.
    #[error("not found: {0}")]
    NotFound(String),

    /// A legal-looking action that fails a game rule: insufficient points,
    /// non-adjacent target, wrong owner, impassable terrain, duplicate
    /// session. Reported to the initiating client only, never broadcast.
    #[error("precondition failed: {0}")]
    PreconditionFailed(&'static str),

    /// The KV backend is unreachable or a command timed out.
    #[error("backend unavailable")]
    Unavailable,

    /// Anything unexpected. Logged with context by the caller; never panics
    /// the room actor.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The stable reason string used in `fillResult`/`upgradeResult` payloads.
    pub fn reason_code(&self) -> &'static str {
        match self {
            CoreError::BadInput(_) => "bad_input",
            CoreError::AuthFailed => "auth_failed",
            CoreError::NotFound(_) => "not_found",
            CoreError::PreconditionFailed(r) => r,
            CoreError::Unavailable => "unavailable",
            CoreError::Internal(_) => "internal",
        }
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() {
            CoreError::Unavailable
        } else {
            CoreError::Internal(e.to_string())
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization error: {e}"))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
