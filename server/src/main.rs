mod config;
mod http;
mod rooms;
mod state;
mod ws;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use hexgame_core::auth::Auth;
use hexgame_core::config::Settings;
use hexgame_core::kv::{KvStore, MemoryKv};
use hexgame_core::kv_redis::RedisKv;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let cli = config::Cli::parse();
    let settings = Arc::new(Settings::from_env());
    let auth = Auth::new(cli.auth_secret.clone());

    let kv: Arc<dyn KvStore> = if cli.in_memory_kv {
        tracing::warn!("running with the in-memory KV backend — state is not shared or durable");
        Arc::new(MemoryKv::new())
    } else {
        match RedisKv::connect(&cli.redis_url, settings.kv_pool_size, settings.kv_connect_timeout_ms, settings.kv_command_timeout_ms).await
        {
            Ok(kv) => Arc::new(kv),
            Err(err) => {
                tracing::error!(?err, "failed to connect to redis");
                panic!("initial redis connection failed: {err}");
            }
        }
    };

    let app_state = AppState::new(kv, settings, auth);

    let watchdog_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            watchdog_state.reap_dead_rooms();
        }
    });

    let app = Router::new()
        .route("/api/register", post(http::register))
        .route("/api/player/color", post(http::change_color))
        .route("/api/history", get(http::history))
        .route("/health", get(http::health))
        .route("/ws/lobby", get(ws::lobby_ws_handler))
        .route("/ws/game/{game_id}", get(ws::game_ws_handler))
        .route("/ws/replay/{game_id}", get(ws::replay_ws_handler))
        .with_state(app_state)
        .fallback_service(ServeDir::new(&cli.static_dir).not_found_service(ServeFile::new(format!("{}/index.html", cli.static_dir))));

    let listener = tokio::net::TcpListener::bind(&cli.bind_addr).await.expect("failed to bind listener");
    tracing::info!(addr = %cli.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

/// Waits for Ctrl+C (or SIGTERM on unix) so `axum::serve` drains in-flight
/// connections instead of dropping them — room actors themselves keep
/// running until their own drain timers expire, this only stops the HTTP
/// listener from accepting new ones.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}
