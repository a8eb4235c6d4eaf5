//! WebSocket room framing (spec §6 "WebSocket surface", §5). Every room kind
//! gets its own upgrade handler and its own paired send/receive task pair,
//! directly generalizing the teacher's `message_relay::handle_server_logic`/
//! `handle_client_logic` split from raw byte frames to JSON room messages —
//! the `tokio::select!`-aborts-the-loser shape carries over unchanged.

use crate::state::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hexgame_core::data::players;
use hexgame_core::error::CoreError;
use protocol::{ClientMessage, LobbyClientMessage, RoomJoinRequest};
use serde::Serialize;
use std::sync::Arc;

use crate::rooms::game::GameRoomHandle;
use crate::rooms::lobby::LobbyRoomHandle;
use crate::rooms::replay::ReplayRoomHandle;

/// Close code for "invalid/missing player or duplicate session" (spec §6).
const CLOSE_INVALID: u16 = 1000;
/// Close code for "not allowed in this lobby" (spec §6) — reused here for
/// "not allowed in this game", the same rejection applied to the other room
/// kind the spec's membership rule covers.
const CLOSE_NOT_ALLOWED: u16 = 1003;
/// Not in the spec's table; used only for unexpected internal failures so a
/// client at least sees a clean close instead of a silent drop.
const CLOSE_INTERNAL: u16 = 1011;

pub async fn game_ws_handler(
    ws: WebSocketUpgrade,
    State(app): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_game_connection(socket, app, game_id))
}

pub async fn lobby_ws_handler(ws: WebSocketUpgrade, State(app): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_lobby_connection(socket, app))
}

pub async fn replay_ws_handler(
    ws: WebSocketUpgrade,
    State(app): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_replay_connection(socket, app, game_id))
}

/// Reads the first inbound message as the `{playerId, token}` join envelope
/// every authenticated room requires before anything else is accepted.
async fn read_join_request(receiver: &mut SplitStream<WebSocket>) -> Option<RoomJoinRequest> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).ok(),
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => return None,
        }
    }
    None
}

async fn close_with(mut sender: SplitSink<WebSocket, Message>, code: u16, reason: &str) {
    let _ = sender
        .send(Message::Close(Some(CloseFrame { code, reason: reason.to_string().into() })))
        .await;
}

async fn handle_game_connection(stream: WebSocket, app: Arc<AppState>, game_id: String) {
    let (sender, mut receiver) = stream.split();

    let Some(join) = read_join_request(&mut receiver).await else {
        close_with(sender, CLOSE_INVALID, "missing join request").await;
        return;
    };
    if !app.auth.verify(&join.player_id, &join.token) {
        close_with(sender, CLOSE_INVALID, "invalid token").await;
        return;
    }
    let Ok(Some(player)) = players::get(app.kv.as_ref(), &join.player_id).await else {
        close_with(sender, CLOSE_INVALID, "unknown player").await;
        return;
    };
    let Some(handle) = app.get_game(&game_id) else {
        close_with(sender, CLOSE_INVALID, "no such game").await;
        return;
    };

    let (outbox_tx, outbox_rx) = tokio::sync::mpsc::channel(crate::rooms::OUTBOUND_CHANNEL_CAPACITY);
    let session_id = match handle.join(player.id.clone(), player.color.clone(), outbox_tx).await {
        Ok(id) => id,
        Err(CoreError::AuthFailed) => {
            close_with(sender, CLOSE_NOT_ALLOWED, "not allowed in this game").await;
            return;
        }
        Err(err) => {
            tracing::warn!(?err, "game join failed");
            close_with(sender, CLOSE_INTERNAL, "join failed").await;
            return;
        }
    };

    let _ = players::touch_last_seen(app.kv.as_ref(), &player.id).await;

    let player_id = player.id.clone();
    let handle_for_recv = handle.clone();
    let recv_player_id = player_id.clone();
    let reason = drive_connection(
        sender,
        receiver,
        outbox_rx,
        move |text| {
            let handle = handle_for_recv.clone();
            let player_id = recv_player_id.clone();
            async move {
                if let Ok(msg) = serde_json::from_str::<ClientMessage>(&text) {
                    handle.client_message(session_id, player_id, msg).await;
                }
            }
        },
    )
    .await;

    tracing::debug!(reason, player_id = %player_id, "game connection ended");
    handle.leave(session_id, player_id).await;
}

async fn handle_lobby_connection(stream: WebSocket, app: Arc<AppState>) {
    let (sender, mut receiver) = stream.split();

    let Some(join) = read_join_request(&mut receiver).await else {
        close_with(sender, CLOSE_INVALID, "missing join request").await;
        return;
    };
    if !app.auth.verify(&join.player_id, &join.token) {
        close_with(sender, CLOSE_INVALID, "invalid token").await;
        return;
    }
    let Ok(Some(player)) = players::get(app.kv.as_ref(), &join.player_id).await else {
        close_with(sender, CLOSE_INVALID, "unknown player").await;
        return;
    };

    let handle: LobbyRoomHandle = match app.get_or_create_lobby().await {
        Ok(h) => h,
        Err(err) => {
            tracing::error!(?err, "failed to open lobby room");
            close_with(sender, CLOSE_INTERNAL, "lobby unavailable").await;
            return;
        }
    };

    let (outbox_tx, outbox_rx) = tokio::sync::mpsc::channel(crate::rooms::OUTBOUND_CHANNEL_CAPACITY);
    let session_id = match handle.join(player.id.clone(), player.username.clone(), player.color.clone(), outbox_tx).await {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(?err, "lobby join failed");
            close_with(sender, CLOSE_INTERNAL, "join failed").await;
            return;
        }
    };

    let _ = players::touch_last_seen(app.kv.as_ref(), &player.id).await;

    let player_id = player.id.clone();
    let handle_for_recv = handle.clone();
    let recv_player_id = player_id.clone();
    let reason = drive_connection(
        sender,
        receiver,
        outbox_rx,
        move |text| {
            let handle = handle_for_recv.clone();
            let player_id = recv_player_id.clone();
            async move {
                if let Ok(msg) = serde_json::from_str::<LobbyClientMessage>(&text) {
                    handle.client_message(session_id, player_id, msg).await;
                }
            }
        },
    )
    .await;

    tracing::debug!(reason, player_id = %player_id, "lobby connection ended");
    handle.leave(session_id, player_id).await;
}

async fn handle_replay_connection(stream: WebSocket, app: Arc<AppState>, game_id: String) {
    let (sender, receiver) = stream.split();

    let handle: ReplayRoomHandle = match app.get_or_create_replay(game_id).await {
        Ok(id) => match app.get_replay(&id) {
            Some(h) => h,
            None => {
                close_with(sender, CLOSE_INTERNAL, "replay unavailable").await;
                return;
            }
        },
        Err(err) => {
            tracing::error!(?err, "failed to open replay room");
            close_with(sender, CLOSE_INTERNAL, "replay unavailable").await;
            return;
        }
    };

    let (outbox_tx, outbox_rx) = tokio::sync::mpsc::channel(crate::rooms::OUTBOUND_CHANNEL_CAPACITY);
    let session_id = match handle.join(outbox_tx).await {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(?err, "replay join failed");
            close_with(sender, CLOSE_INTERNAL, "join failed").await;
            return;
        }
    };

    // Viewers are anonymous and send no in-room messages; the receive side
    // only exists to detect the socket closing.
    let reason = drive_connection(sender, receiver, outbox_rx, |_text| async {}).await;

    tracing::debug!(reason, "replay connection ended");
    handle.leave(session_id).await;
}

/// Spawns the paired send/receive tasks and races them exactly like the
/// teacher's `handle_server_logic`: whichever finishes first wins, the other
/// is aborted, and a reason string comes back for logging.
async fn drive_connection<M, F, Fut>(
    sender: SplitSink<WebSocket, Message>,
    receiver: SplitStream<WebSocket>,
    outbox_rx: tokio::sync::mpsc::Receiver<M>,
    on_text: F,
) -> &'static str
where
    M: Serialize + Send + 'static,
    F: Fn(String) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let mut send_task = tokio::spawn(send_loop(sender, outbox_rx));
    let mut recv_task = tokio::spawn(recv_loop(receiver, on_text));

    tokio::select! {
        res = &mut send_task => { recv_task.abort(); res.unwrap_or("send task panicked") }
        res = &mut recv_task => { send_task.abort(); res.unwrap_or("receive task panicked") }
    }
}

async fn send_loop<M: Serialize>(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbox_rx: tokio::sync::mpsc::Receiver<M>,
) -> &'static str {
    while let Some(message) = outbox_rx.recv().await {
        let Ok(text) = serde_json::to_string(&message) else { continue };
        if sender.send(Message::Text(text.into())).await.is_err() {
            return "send failed, client gone";
        }
    }
    "outbox closed"
}

async fn recv_loop<F, Fut>(mut receiver: SplitStream<WebSocket>, on_text: F) -> &'static str
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => on_text(text.to_string()).await,
            Ok(Message::Close(_)) => return "client closed",
            Ok(_) => continue,
            Err(_) => return "connection lost",
        }
    }
    "connection lost"
}
