//! The Game Room actor (spec §4.4): the simulation core wired into the
//! single-writer room pattern of `rooms::mod`. One `tokio` task per game,
//! draining one `mpsc` channel in strict arrival order — inbound client
//! messages, timer firings, and drain checks all funnel through it, which is
//! what makes "state mutations and broadcasts on a single connection match
//! the order of inbound messages" (spec §5) hold without any locking inside
//! the room.
//!
//! Ticks and the auto-expansion scan are just background tasks that push
//! their own command variant into the same channel on an interval — they
//! never touch game state directly, so the room's serialization guarantee
//! extends to them for free.

use hexgame_core::config::Settings;
use hexgame_core::data::games::{self, StartPlayer};
use hexgame_core::data::hexes;
use hexgame_core::engine::{self, ClickOutcome};
use hexgame_core::error::{CoreError, CoreResult};
use hexgame_core::kv::KvStore;
use hexgame_core::terrain;
use protocol::hex::Hex;
use protocol::{ClientMessage, FillResult, HexCoord, ServerMessage, Upgrade, UpgradeRequest, UpgradeResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use super::{next_session_id, Outbox, SessionId};

pub type GameOutbox = Outbox<ServerMessage>;

/// A handle to a running game room. Cheaply cloneable; holds only the
/// channel into the actor, never the state itself.
#[derive(Clone)]
pub struct GameRoomHandle {
    tx: mpsc::Sender<GameCommand>,
}

impl GameRoomHandle {
    /// Returns `true` once the room's actor task has exited — the teacher's
    /// `cleanup_dead_rooms` idiom (`relay-server::main`), generalized from a
    /// dead-broadcast-channel check to a closed-mpsc check.
    pub fn is_dead(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn join(
        &self,
        player_id: String,
        color: String,
        outbox_tx: mpsc::Sender<ServerMessage>,
    ) -> CoreResult<SessionId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(GameCommand::Join { player_id, color, outbox_tx, reply: reply_tx })
            .await
            .map_err(|_| CoreError::Unavailable)?;
        reply_rx.await.map_err(|_| CoreError::Unavailable)?
    }

    pub async fn leave(&self, session_id: SessionId, player_id: String) {
        let _ = self.tx.send(GameCommand::Leave { session_id, player_id }).await;
    }

    pub async fn client_message(&self, session_id: SessionId, player_id: String, msg: ClientMessage) {
        let _ = self.tx.send(GameCommand::Client { session_id, player_id, msg }).await;
    }
}

enum GameCommand {
    Join {
        player_id: String,
        color: String,
        outbox_tx: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<CoreResult<SessionId>>,
    },
    Leave {
        session_id: SessionId,
        player_id: String,
    },
    Client {
        session_id: SessionId,
        player_id: String,
        msg: ClientMessage,
    },
    EconomyTick,
    AutoExpand,
    CheckDrain {
        generation: u64,
    },
}

struct PlayerState {
    color: String,
    connected: bool,
    started: bool,
}

struct GameRoom {
    kv: Arc<dyn KvStore>,
    settings: Arc<Settings>,
    game_id: String,
    allowed_player_ids: HashSet<String>,
    players: HashMap<String, PlayerState>,
    sessions: HashMap<SessionId, GameOutbox>,
    player_session: HashMap<String, SessionId>,
    lobby_start_time: i64,
    first_join_at: Option<i64>,
    drain_generation: u64,
    self_tx: mpsc::Sender<GameCommand>,
}

/// Spawns a fresh game room: persists the `Game` record, materializes
/// terrain into the hex hash, then starts the actor task and its tick
/// timers. `start_players` becomes both the allowed-player-id set (spec
/// §4.4 membership rule) and the color registry used before any hex exists.
pub async fn spawn_game_room(
    kv: Arc<dyn KvStore>,
    settings: Arc<Settings>,
    game_id: String,
    lobby_start_time: i64,
    start_players: Vec<StartPlayer>,
    terrain_seed: u64,
) -> CoreResult<GameRoomHandle> {
    let now = now_ms();
    games::create(kv.as_ref(), &game_id, lobby_start_time, &start_players, terrain_seed, now).await?;

    let terrain_map = terrain::generate_terrain(&settings, terrain_seed);
    for (hex, kind) in terrain_map {
        hexes::set_hex(kv.as_ref(), &game_id, hex, None, None, None, Some(kind), false, now).await?;
    }

    let allowed_player_ids: HashSet<String> = start_players.iter().map(|sp| sp.player_id.clone()).collect();
    let players = start_players
        .into_iter()
        .map(|sp| (sp.player_id, PlayerState { color: sp.color, connected: false, started: false }))
        .collect();

    let (tx, rx) = mpsc::channel(256);
    let room = GameRoom {
        kv,
        settings: settings.clone(),
        game_id: game_id.clone(),
        allowed_player_ids,
        players,
        sessions: HashMap::new(),
        player_session: HashMap::new(),
        lobby_start_time,
        first_join_at: None,
        drain_generation: 0,
        self_tx: tx.clone(),
    };

    let economy_tx = tx.clone();
    let economy_interval = std::time::Duration::from_millis(settings.economy_tick_ms);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(economy_interval);
        loop {
            ticker.tick().await;
            if economy_tx.send(GameCommand::EconomyTick).await.is_err() {
                break;
            }
        }
    });

    let auto_expand_tx = tx.clone();
    let auto_expand_interval = std::time::Duration::from_millis(settings.auto_expand_interval_ms);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(auto_expand_interval);
        loop {
            ticker.tick().await;
            if auto_expand_tx.send(GameCommand::AutoExpand).await.is_err() {
                break;
            }
        }
    });

    let span = tracing::info_span!("room", game_id = %game_id, kind = "game");
    tokio::spawn(async move { room.run(rx).await }.instrument(span));

    Ok(GameRoomHandle { tx })
}

impl GameRoom {
    async fn run(mut self, mut rx: mpsc::Receiver<GameCommand>) {
        tracing::info!("game room started");
        while let Some(cmd) = rx.recv().await {
            match cmd {
                GameCommand::Join { player_id, color, outbox_tx, reply } => {
                    let result = self.handle_join(player_id, color, outbox_tx).await;
                    let _ = reply.send(result);
                }
                GameCommand::Leave { session_id, player_id } => self.handle_leave(session_id, player_id),
                GameCommand::Client { session_id, player_id, msg } => {
                    self.handle_client_message(session_id, &player_id, msg).await
                }
                GameCommand::EconomyTick => self.handle_economy_tick().await,
                GameCommand::AutoExpand => self.handle_auto_expand().await,
                GameCommand::CheckDrain { generation } => {
                    if self.handle_check_drain(generation).await {
                        break;
                    }
                }
            }
        }
        tracing::info!("game room disposed");
    }

    fn is_live(&self) -> bool {
        match self.first_join_at {
            Some(t) => now_ms() >= t + self.settings.start_delay_ms as i64 + 100,
            None => false,
        }
    }

    fn in_start_window(&self) -> bool {
        now_ms() <= self.lobby_start_time + self.settings.start_delay_ms as i64
    }

    async fn handle_join(
        &mut self,
        player_id: String,
        color: String,
        outbox_tx: mpsc::Sender<ServerMessage>,
    ) -> CoreResult<SessionId> {
        if !self.allowed_player_ids.contains(&player_id) {
            return Err(CoreError::AuthFailed);
        }

        if self.first_join_at.is_none() {
            self.first_join_at = Some(now_ms());
        }

        // Idempotent reconnect: evict the stale session mapping, if any.
        if let Some(old_session) = self.player_session.remove(&player_id) {
            self.sessions.remove(&old_session);
        }

        let session_id = next_session_id();
        let outbox = GameOutbox::new(outbox_tx);
        self.sessions.insert(session_id, outbox.clone());
        self.player_session.insert(player_id.clone(), session_id);

        let entry = self.players.entry(player_id.clone()).or_insert_with(|| PlayerState {
            color: color.clone(),
            connected: false,
            started: false,
        });
        entry.connected = true;
        let assigned_color = entry.color.clone();
        self.drain_generation += 1;

        outbox.send(ServerMessage::AssignedColor { color: assigned_color });
        let history = engine::history_snapshot(self.kv.as_ref(), &self.game_id).await?;
        outbox.send(ServerMessage::History { hexes: history });
        outbox.send(ServerMessage::LobbyStartTime {
            ts: self.lobby_start_time,
            start_delay_ms: self.settings.start_delay_ms,
        });

        tracing::info!(player_id = %player_id, session_id, "player joined");
        Ok(session_id)
    }

    fn handle_leave(&mut self, session_id: SessionId, player_id: String) {
        // Only drop the live mapping if this session is still the current
        // one for the player — a stale connection's belated Leave must not
        // undo a newer reconnect.
        if self.player_session.get(&player_id) == Some(&session_id) {
            self.sessions.remove(&session_id);
            if let Some(state) = self.players.get_mut(&player_id) {
                state.connected = false;
            }
            tracing::info!(player_id = %player_id, session_id, "player disconnected");
        }

        if !self.players.values().any(|p| p.connected) {
            self.drain_generation += 1;
            let generation = self.drain_generation;
            let tx = self.tx_for_drain();
            let grace = std::time::Duration::from_secs(self.settings.drain_grace_secs);
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let _ = tx.send(GameCommand::CheckDrain { generation }).await;
            });
        }
    }

    /// `CheckDrain` only disposes the room if nobody reconnected since this
    /// specific timer was armed (spec §4.4 "if any session reconnects,
    /// cancel the timer and resume" — implemented as a generation check
    /// rather than literal cancellation, since the timer task has no handle
    /// back into the room once spawned).
    async fn handle_check_drain(&mut self, generation: u64) -> bool {
        if generation != self.drain_generation {
            return false;
        }
        if self.players.values().any(|p| p.connected) {
            return false;
        }
        if let Err(err) = games::close(self.kv.as_ref(), &self.game_id).await {
            tracing::warn!(?err, "failed to mark game closed on dispose");
        }
        tracing::info!("drain grace expired, disposing room");
        true
    }

    /// The drain timer needs a sender back into this room's own channel; we
    /// stash one on first use rather than threading it through every call
    /// site, since `spawn_game_room` already owns the original.
    fn tx_for_drain(&self) -> mpsc::Sender<GameCommand> {
        self.self_tx.clone()
    }

    async fn handle_client_message(&mut self, session_id: SessionId, player_id: &str, msg: ClientMessage) {
        // A message from a session that's no longer the player's current one
        // (superseded by a reconnect) is simply ignored.
        if self.player_session.get(player_id) != Some(&session_id) {
            return;
        }
        let Some(outbox) = self.sessions.get(&session_id).cloned() else { return };
        let color = self.players.get(player_id).map(|p| p.color.clone()).unwrap_or_default();

        match msg {
            ClientMessage::ChooseStart { q, r } => self.handle_choose_start(player_id, &outbox, Hex::new(q, r)).await,
            ClientMessage::FillHex { q, r } => {
                self.handle_single_fill(player_id, &color, &outbox, Hex::new(q, r), true, true).await
            }
            ClientMessage::ClickHex { q, r } => {
                self.handle_single_fill(player_id, &color, &outbox, Hex::new(q, r), true, true).await
            }
            ClientMessage::BatchFillHex { hexes } => self.handle_batch_fill(player_id, &color, &outbox, hexes).await,
            ClientMessage::UpgradeHex { q, r, upgrade_type } => {
                self.handle_upgrade(player_id, &outbox, Hex::new(q, r), upgrade_type).await
            }
            ClientMessage::BatchUpgradeHex { hexes } => self.handle_batch_upgrade(player_id, &outbox, hexes).await,
            ClientMessage::RequestHoverCost { q, r } => self.handle_hover_cost(player_id, &outbox, Hex::new(q, r)).await,
            ClientMessage::RequestPointsUpdate => self.handle_points_request(player_id, &outbox).await,
        }
    }

    async fn handle_choose_start(&mut self, player_id: &str, outbox: &GameOutbox, target: Hex) {
        if !self.in_start_window() {
            outbox.send(ServerMessage::FillResultMsg(FillResult {
                q: target.q,
                r: target.r,
                ok: false,
                reason: Some("start_window_closed".to_string()),
            }));
            return;
        }
        let color = self.players.get(player_id).map(|p| p.color.clone()).unwrap_or_default();
        match engine::choose_start(self.kv.as_ref(), &self.settings, &self.game_id, player_id, &color, target).await {
            Ok(view) => {
                if let Some(state) = self.players.get_mut(player_id) {
                    state.started = true;
                }
                self.broadcast(ServerMessage::Update(view));
                outbox.send(ServerMessage::FillResultMsg(FillResult { q: target.q, r: target.r, ok: true, reason: None }));
            }
            Err(err) => outbox.send(ServerMessage::FillResultMsg(FillResult {
                q: target.q,
                r: target.r,
                ok: false,
                reason: Some(err.reason_code().to_string()),
            })),
        }
    }

    /// Shared by `fillHex` and `clickHex` (spec §9 open question 1: both
    /// fold into one `update` event, and here into one handler — the
    /// distinction the source drew between them never affected behavior).
    async fn handle_single_fill(
        &mut self,
        player_id: &str,
        color: &str,
        outbox: &GameOutbox,
        target: Hex,
        check_adjacency: bool,
        owned_tile_shortcut: bool,
    ) {
        let started = self.players.get(player_id).map(|p| p.started).unwrap_or(false);
        if !started {
            if self.in_start_window() {
                self.handle_choose_start(player_id, outbox, target).await;
            } else {
                outbox.send(ServerMessage::FillResultMsg(FillResult {
                    q: target.q,
                    r: target.r,
                    ok: false,
                    reason: Some("not_started".to_string()),
                }));
            }
            return;
        }

        let result = engine::attempt_capture(
            self.kv.as_ref(),
            &self.settings,
            &self.game_id,
            player_id,
            color,
            target,
            check_adjacency,
            owned_tile_shortcut,
        )
        .await;

        match result {
            Ok(ClickOutcome::OwnedMenu { upgrade }) => {
                outbox.send(ServerMessage::OpenOwnedTileMenu { q: target.q, r: target.r, upgrade });
            }
            Ok(ClickOutcome::Captured(captured)) => {
                self.broadcast(ServerMessage::Update(captured.view));
                outbox.send(ServerMessage::FillResultMsg(FillResult { q: target.q, r: target.r, ok: true, reason: None }));
                self.broadcast_points(captured.attacker);
                if let Some(previous) = captured.previous_owner {
                    self.broadcast_points(previous);
                }
            }
            Err(err) => {
                outbox.send(ServerMessage::FillResultMsg(FillResult {
                    q: target.q,
                    r: target.r,
                    ok: false,
                    reason: Some(err.reason_code().to_string()),
                }));
            }
        }
    }

    /// The drag-paint batch path: no adjacency check, no owned-tile
    /// shortcut, each hex reported individually (spec §4.4 "drag-paint
    /// path").
    async fn handle_batch_fill(&mut self, player_id: &str, color: &str, outbox: &GameOutbox, targets: Vec<HexCoord>) {
        let started = self.players.get(player_id).map(|p| p.started).unwrap_or(false);
        let mut results = Vec::with_capacity(targets.len());
        for coord in targets {
            let target = Hex::new(coord.q, coord.r);
            if !started {
                results.push(FillResult { q: target.q, r: target.r, ok: false, reason: Some("not_started".to_string()) });
                continue;
            }
            let outcome =
                engine::attempt_capture(self.kv.as_ref(), &self.settings, &self.game_id, player_id, color, target, false, false)
                    .await;
            match outcome {
                Ok(ClickOutcome::Captured(captured)) => {
                    self.broadcast(ServerMessage::Update(captured.view));
                    results.push(FillResult { q: target.q, r: target.r, ok: true, reason: None });
                    self.broadcast_points(captured.attacker);
                    if let Some(previous) = captured.previous_owner {
                        self.broadcast_points(previous);
                    }
                }
                Ok(ClickOutcome::OwnedMenu { .. }) => {
                    results.push(FillResult { q: target.q, r: target.r, ok: false, reason: Some("already_owned".to_string()) });
                }
                Err(err) => {
                    results.push(FillResult { q: target.q, r: target.r, ok: false, reason: Some(err.reason_code().to_string()) });
                }
            }
        }
        outbox.send(ServerMessage::BatchFillResult { results });
    }

    async fn handle_upgrade(&mut self, player_id: &str, outbox: &GameOutbox, target: Hex, upgrade: Upgrade) {
        match engine::purchase_upgrade(self.kv.as_ref(), &self.settings, &self.game_id, player_id, target, upgrade).await {
            Ok(outcome) => {
                self.broadcast(ServerMessage::Update(outcome.view));
                outbox.send(ServerMessage::UpgradeResultMsg(UpgradeResult {
                    q: target.q,
                    r: target.r,
                    ok: true,
                    upgrade_type: Some(upgrade),
                    error: None,
                }));
                self.broadcast_points(outcome.owner);
            }
            Err(err) => outbox.send(ServerMessage::UpgradeResultMsg(UpgradeResult {
                q: target.q,
                r: target.r,
                ok: false,
                upgrade_type: None,
                error: Some(err.reason_code().to_string()),
            })),
        }
    }

    async fn handle_batch_upgrade(&mut self, player_id: &str, outbox: &GameOutbox, requests: Vec<UpgradeRequest>) {
        let mut results = Vec::with_capacity(requests.len());
        for req in requests {
            let target = Hex::new(req.q, req.r);
            match engine::purchase_upgrade(self.kv.as_ref(), &self.settings, &self.game_id, player_id, target, req.upgrade_type).await
            {
                Ok(outcome) => {
                    self.broadcast(ServerMessage::Update(outcome.view));
                    results.push(UpgradeResult { q: target.q, r: target.r, ok: true, upgrade_type: Some(req.upgrade_type), error: None });
                    self.broadcast_points(outcome.owner);
                }
                Err(err) => results.push(UpgradeResult {
                    q: target.q,
                    r: target.r,
                    ok: false,
                    upgrade_type: None,
                    error: Some(err.reason_code().to_string()),
                }),
            }
        }
        outbox.send(ServerMessage::BatchUpgradeResult { results });
    }

    async fn handle_hover_cost(&self, player_id: &str, outbox: &GameOutbox, target: Hex) {
        match engine::hover_cost(self.kv.as_ref(), &self.settings, &self.game_id, player_id, target).await {
            Ok(cost) => outbox.send(ServerMessage::HoverCost { q: target.q, r: target.r, cost }),
            Err(_) => outbox.send(ServerMessage::HoverCost { q: target.q, r: target.r, cost: None }),
        };
    }

    async fn handle_points_request(&self, player_id: &str, outbox: &GameOutbox) {
        if let Ok(snapshot) = engine::points_snapshot(self.kv.as_ref(), &self.settings, &self.game_id, player_id).await {
            outbox.send(ServerMessage::PointsUpdate {
                player_id: snapshot.player_id,
                points: snapshot.points,
                tiles: snapshot.tiles,
                max_points: snapshot.max_points,
            });
        }
    }

    /// Spec §4.4 "Economy tick": once live, every connected player's points
    /// rise toward their cap. No broadcast is produced (spec §9 open
    /// question 3 — clients poll `requestPointsUpdate` instead).
    async fn handle_economy_tick(&mut self) {
        if !self.kv.is_available() {
            tracing::warn!("kv unavailable, suspending economy tick");
            return;
        }
        if !self.is_live() {
            return;
        }
        let connected: Vec<String> = self.players.iter().filter(|(_, p)| p.connected).map(|(id, _)| id.clone()).collect();
        for player_id in connected {
            if let Err(err) = engine::economy_tick(self.kv.as_ref(), &self.settings, &self.game_id, &player_id).await {
                tracing::debug!(?err, player_id, "economy tick failed for player");
            }
        }
    }

    async fn handle_auto_expand(&mut self) {
        if !self.kv.is_available() {
            tracing::warn!("kv unavailable, suspending auto-expansion scan");
            return;
        }
        match engine::run_auto_expansion(self.kv.as_ref(), &self.settings, &self.game_id).await {
            Ok(captures) => {
                for capture in captures {
                    self.broadcast(ServerMessage::Update(capture.view));
                    self.broadcast_points(capture.new_owner);
                    if let Some(previous) = capture.previous_owner {
                        self.broadcast_points(previous);
                    }
                }
            }
            Err(err) => tracing::warn!(?err, "auto-expansion scan failed"),
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        for outbox in self.sessions.values() {
            outbox.send(message.clone());
        }
    }

    fn broadcast_points(&self, snapshot: engine::PointsSnapshot) {
        self.broadcast(ServerMessage::PointsUpdate {
            player_id: snapshot.player_id,
            points: snapshot.points,
            tiles: snapshot.tiles,
            max_points: snapshot.max_points,
        });
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
