//! Process configuration: bind address, KV backend, and the HMAC secret, as
//! a `clap`-derived CLI layered over environment variables — the teacher's
//! `GameConfig.json` hot-reload role, generalized to a horizontally scaled
//! process that can't assume a shared filesystem with its peers (spec
//! SPEC_FULL §3 "Configuration").

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "hexgame-server", about = "Authoritative hex territory-capture game server")]
pub struct Cli {
    /// Address to bind the HTTP/WebSocket listener on.
    #[arg(long, env = "HEXGAME_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Redis connection URL for the KV Store Facade.
    #[arg(long, env = "HEXGAME_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// HMAC secret for player tokens. Rotating this invalidates every
    /// outstanding token (spec §4.1).
    #[arg(long, env = "HEXGAME_AUTH_SECRET", default_value = "dev-secret-change-me")]
    pub auth_secret: String,

    /// Directory containing the static client bundle to serve at `/`.
    #[arg(long, env = "HEXGAME_STATIC_DIR", default_value = "./public")]
    pub static_dir: String,

    /// Use the in-memory KV backend instead of Redis. Intended for local
    /// single-process development only — state is lost on restart and is
    /// not shared across processes.
    #[arg(long, env = "HEXGAME_IN_MEMORY_KV", default_value_t = false)]
    pub in_memory_kv: bool,
}
