//! HTTP surface (spec §6): registration, color changes, event history for
//! replays, and health. Plain `axum` handlers reading/writing through the
//! Game Data Layer only — no room state touches this file, matching spec
//! §5's "the HTTP surface runs independently".

use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use hexgame_core::auth;
use hexgame_core::data::{events, players};
use hexgame_core::error::CoreError;
use hexgame_core::kv::KvStore;
use protocol::{
    ColorChangeRequest, HealthResponse, HistoryResponse, OkResponse, RegisterRequest, RegisterResponse, ReplayEvent,
};
use std::sync::Arc;

pub async fn register(
    State(app): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, (StatusCode, String)> {
    let (player, token) = auth::register(app.kv.as_ref(), &app.auth, &app.settings.player_colors, &req.username)
        .await
        .map_err(map_error)?;
    Ok(Json(RegisterResponse { player_id: player.id, token, username: player.username, color: player.color }))
}

pub async fn change_color(
    State(app): State<Arc<AppState>>,
    Json(req): Json<ColorChangeRequest>,
) -> Result<Json<OkResponse>, (StatusCode, String)> {
    if !app.auth.verify(&req.player_id, &req.token) {
        return Err((StatusCode::UNAUTHORIZED, "invalid token".to_string()));
    }
    players::set_color(app.kv.as_ref(), &req.player_id, &req.color).await.map_err(map_error)?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(serde::Deserialize)]
pub struct HistoryQuery {
    /// Named `lobbyId` to match the spec's query parameter verbatim; the
    /// value is actually the game/room id events are logged under, since a
    /// lobby itself never accrues hex events.
    #[serde(rename = "lobbyId")]
    pub lobby_id: String,
}

pub async fn history(
    State(app): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let events = events::list_events(app.kv.as_ref(), &query.lobby_id).await.map_err(map_error)?;
    let clicks: Vec<ReplayEvent> = events
        .iter()
        .map(|e| ReplayEvent {
            game_id: e.game_id.clone(),
            player_id: e.player_id.clone(),
            color: e.color.clone(),
            q: e.q,
            r: e.r,
            event_type: e.event_type.as_str().to_string(),
            timestamp: e.timestamp,
        })
        .collect();
    Ok(Json(HistoryResponse { clicks }))
}

pub async fn health(State(app): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: now_ms(),
        kv_available: app.kv.is_available(),
        active_rooms: app.active_room_count(),
    })
}

fn map_error(err: CoreError) -> (StatusCode, String) {
    let status = match &err {
        CoreError::BadInput(_) => StatusCode::BAD_REQUEST,
        CoreError::AuthFailed => StatusCode::UNAUTHORIZED,
        CoreError::NotFound(_) => StatusCode::GONE,
        CoreError::PreconditionFailed(_) => StatusCode::CONFLICT,
        CoreError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.reason_code().to_string())
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
