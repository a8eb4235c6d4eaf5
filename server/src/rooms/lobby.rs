//! The Lobby Room actor (spec §4.5): pre-game staging. Same single-writer
//! actor shape as the game room, scaled down to a roster and a countdown.
//! Kickoff hands the ready roster to `AppState::create_game`, which owns the
//! matchmaking invariant that only one room exists per `gameId` (spec §5).

use crate::state::AppState;
use hexgame_core::data::games::StartPlayer;
use hexgame_core::data::lobbies;
use hexgame_core::error::{CoreError, CoreResult};
use hexgame_core::kv::KvStore;
use protocol::{LobbyClientMessage, LobbyServerMessage, RosterEntry};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use super::{next_session_id, Outbox, SessionId};

pub type LobbyOutbox = Outbox<LobbyServerMessage>;

#[derive(Clone)]
pub struct LobbyRoomHandle {
    tx: mpsc::Sender<LobbyCommand>,
}

impl LobbyRoomHandle {
    pub fn is_dead(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn join(
        &self,
        player_id: String,
        username: String,
        color: String,
        outbox_tx: mpsc::Sender<LobbyServerMessage>,
    ) -> CoreResult<SessionId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(LobbyCommand::Join { player_id, username, color, outbox_tx, reply: reply_tx })
            .await
            .map_err(|_| CoreError::Unavailable)?;
        reply_rx.await.map_err(|_| CoreError::Unavailable)?
    }

    pub async fn leave(&self, session_id: SessionId, player_id: String) {
        let _ = self.tx.send(LobbyCommand::Leave { session_id, player_id }).await;
    }

    pub async fn client_message(&self, session_id: SessionId, player_id: String, msg: LobbyClientMessage) {
        let _ = self.tx.send(LobbyCommand::Client { session_id, player_id, msg }).await;
    }
}

enum LobbyCommand {
    Join {
        player_id: String,
        username: String,
        color: String,
        outbox_tx: mpsc::Sender<LobbyServerMessage>,
        reply: oneshot::Sender<CoreResult<SessionId>>,
    },
    Leave {
        session_id: SessionId,
        player_id: String,
    },
    Client {
        session_id: SessionId,
        player_id: String,
        msg: LobbyClientMessage,
    },
    CountdownTick,
    CheckDrain {
        generation: u64,
    },
}

struct RosterSlot {
    username: String,
    color: String,
    started: bool,
    connected: bool,
}

struct LobbyRoom {
    app: Arc<AppState>,
    lobby_id: String,
    roster: HashMap<String, RosterSlot>,
    sessions: HashMap<SessionId, LobbyOutbox>,
    player_session: HashMap<String, SessionId>,
    countdown: Option<u32>,
    drain_generation: u64,
    self_tx: mpsc::Sender<LobbyCommand>,
}

pub async fn spawn_lobby_room(app: Arc<AppState>, lobby_id: String) -> CoreResult<LobbyRoomHandle> {
    lobbies::create(app.kv.as_ref(), &lobby_id, now_ms()).await?;

    let (tx, rx) = mpsc::channel(256);
    let room = LobbyRoom {
        app,
        lobby_id: lobby_id.clone(),
        roster: HashMap::new(),
        sessions: HashMap::new(),
        player_session: HashMap::new(),
        countdown: None,
        drain_generation: 0,
        self_tx: tx.clone(),
    };

    let countdown_tx = tx.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            ticker.tick().await;
            if countdown_tx.send(LobbyCommand::CountdownTick).await.is_err() {
                break;
            }
        }
    });

    let span = tracing::info_span!("room", lobby_id = %lobby_id, kind = "lobby");
    tokio::spawn(async move { room.run(rx).await }.instrument(span));

    Ok(LobbyRoomHandle { tx })
}

impl LobbyRoom {
    async fn run(mut self, mut rx: mpsc::Receiver<LobbyCommand>) {
        tracing::info!("lobby room started");
        while let Some(cmd) = rx.recv().await {
            match cmd {
                LobbyCommand::Join { player_id, username, color, outbox_tx, reply } => {
                    let result = self.handle_join(player_id, username, color, outbox_tx).await;
                    let _ = reply.send(result);
                }
                LobbyCommand::Leave { session_id, player_id } => self.handle_leave(session_id, player_id).await,
                LobbyCommand::Client { session_id, player_id, msg } => {
                    self.handle_client_message(session_id, &player_id, msg).await
                }
                LobbyCommand::CountdownTick => self.handle_countdown_tick().await,
                LobbyCommand::CheckDrain { generation } => {
                    if self.handle_check_drain(generation).await {
                        break;
                    }
                }
            }
        }
        tracing::info!("lobby room disposed");
    }

    async fn handle_join(
        &mut self,
        player_id: String,
        username: String,
        color: String,
        outbox_tx: mpsc::Sender<LobbyServerMessage>,
    ) -> CoreResult<SessionId> {
        if let Some(old_session) = self.player_session.remove(&player_id) {
            self.sessions.remove(&old_session);
        }

        let session_id = next_session_id();
        let outbox = LobbyOutbox::new(outbox_tx);
        self.sessions.insert(session_id, outbox.clone());
        self.player_session.insert(player_id.clone(), session_id);

        lobbies::add_player(self.app.kv.as_ref(), &self.lobby_id, &player_id).await?;
        let slot = self.roster.entry(player_id.clone()).or_insert_with(|| RosterSlot {
            username: username.clone(),
            color: color.clone(),
            started: false,
            connected: false,
        });
        slot.connected = true;
        self.drain_generation += 1;

        self.broadcast_roster();
        tracing::info!(player_id = %player_id, session_id, "player joined lobby");
        Ok(session_id)
    }

    async fn handle_leave(&mut self, session_id: SessionId, player_id: String) {
        if self.player_session.get(&player_id) == Some(&session_id) {
            self.sessions.remove(&session_id);
            if let Some(slot) = self.roster.get_mut(&player_id) {
                slot.connected = false;
            }
            let _ = lobbies::remove_player(self.app.kv.as_ref(), &self.lobby_id, &player_id).await;
        }

        if !self.roster.values().any(|s| s.connected) {
            self.drain_generation += 1;
            let generation = self.drain_generation;
            let tx = self.self_tx.clone();
            let grace = std::time::Duration::from_secs(self.app.settings.drain_grace_secs);
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let _ = tx.send(LobbyCommand::CheckDrain { generation }).await;
            });
        } else {
            self.broadcast_roster();
        }
    }

    async fn handle_check_drain(&mut self, generation: u64) -> bool {
        if generation != self.drain_generation {
            return false;
        }
        if self.roster.values().any(|s| s.connected) {
            return false;
        }
        if let Err(err) = lobbies::close(self.app.kv.as_ref(), &self.lobby_id).await {
            tracing::warn!(?err, "failed to mark lobby closed on dispose");
        }
        self.app.retire_lobby(&self.lobby_id);
        tracing::info!("drain grace expired, disposing lobby");
        true
    }

    async fn handle_client_message(&mut self, session_id: SessionId, player_id: &str, msg: LobbyClientMessage) {
        if self.player_session.get(player_id) != Some(&session_id) {
            return;
        }
        match msg {
            LobbyClientMessage::JoinGame => {
                if let Some(slot) = self.roster.get_mut(player_id) {
                    slot.started = true;
                }
                self.broadcast_roster();
                self.maybe_start_countdown();
            }
            LobbyClientMessage::CreateReplay { game_id } => {
                let Some(outbox) = self.sessions.get(&session_id).cloned() else { return };
                match self.app.get_or_create_replay(game_id).await {
                    Ok(room_id) => outbox.send(LobbyServerMessage::ReplayCreated { room_id }),
                    Err(err) => tracing::warn!(?err, "failed to create replay room"),
                }
            }
        }
    }

    fn maybe_start_countdown(&mut self) {
        if self.countdown.is_some() {
            return;
        }
        let ready = self.roster.values().filter(|s| s.started && s.connected).count();
        if ready >= self.app.settings.min_ready {
            self.countdown = Some(5);
            self.broadcast(LobbyServerMessage::Countdown { seconds_left: 5 });
        }
    }

    async fn handle_countdown_tick(&mut self) {
        let Some(current) = self.countdown else { return };
        if current == 0 {
            self.countdown = None;
            self.kickoff().await;
            return;
        }
        let next = current - 1;
        if next == 0 {
            self.countdown = None;
            self.kickoff().await;
        } else {
            self.countdown = Some(next);
            self.broadcast(LobbyServerMessage::Countdown { seconds_left: next });
        }
    }

    async fn kickoff(&mut self) {
        let ready_ids: Vec<String> = self
            .roster
            .iter()
            .filter(|(_, slot)| slot.started && slot.connected)
            .map(|(id, _)| id.clone())
            .collect();
        if ready_ids.len() < self.app.settings.min_ready {
            return;
        }

        let start_players: Vec<StartPlayer> = ready_ids
            .iter()
            .map(|id| StartPlayer { player_id: id.clone(), color: self.roster[id].color.clone() })
            .collect();
        let terrain_seed = rand::thread_rng().gen();

        let game_id = match self.app.create_game(start_players, now_ms(), terrain_seed).await {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(?err, "failed to create game room at kickoff");
                self.countdown = None;
                return;
            }
        };

        for player_id in &ready_ids {
            if let Some(session_id) = self.player_session.get(player_id) {
                if let Some(outbox) = self.sessions.get(session_id) {
                    outbox.send(LobbyServerMessage::StartGame { room_id: game_id.clone() });
                }
            }
            self.roster.remove(player_id);
            if let Some(session_id) = self.player_session.remove(player_id) {
                self.sessions.remove(&session_id);
            }
            let _ = lobbies::remove_player(self.app.kv.as_ref(), &self.lobby_id, player_id).await;
        }

        tracing::info!(game_id = %game_id, players = ready_ids.len(), "lobby kicked off a game");
        self.broadcast_roster();
    }

    fn broadcast(&self, message: LobbyServerMessage) {
        for outbox in self.sessions.values() {
            outbox.send(message.clone());
        }
    }

    fn broadcast_roster(&self) {
        let players = self
            .roster
            .iter()
            .map(|(id, slot)| RosterEntry {
                player_id: id.clone(),
                username: slot.username.clone(),
                color: slot.color.clone(),
                started: slot.started,
            })
            .collect();
        self.broadcast(LobbyServerMessage::Roster { players });
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
