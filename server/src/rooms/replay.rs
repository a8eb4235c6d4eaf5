//! The Replay Room actor (spec §4.6): plays a finished game's event log back
//! to viewers at the pace it originally happened, normalized so playback
//! always starts at t=0. Anonymous — no token, no player identity, just a
//! viewer count driving the same drain lifecycle as the other rooms.

use crate::state::AppState;
use hexgame_core::data::events::{self, GameEvent};
use hexgame_core::error::{CoreError, CoreResult};
use protocol::{ReplayEvent, ReplayServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use super::{next_session_id, Outbox, SessionId};

pub type ReplayOutbox = Outbox<ReplayServerMessage>;

#[derive(Clone)]
pub struct ReplayRoomHandle {
    tx: mpsc::Sender<ReplayCommand>,
}

impl ReplayRoomHandle {
    pub fn is_dead(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn join(&self, outbox_tx: mpsc::Sender<ReplayServerMessage>) -> CoreResult<SessionId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(ReplayCommand::Join { outbox_tx, reply: reply_tx }).await.map_err(|_| CoreError::Unavailable)?;
        reply_rx.await.map_err(|_| CoreError::Unavailable)?
    }

    pub async fn leave(&self, session_id: SessionId) {
        let _ = self.tx.send(ReplayCommand::Leave { session_id }).await;
    }
}

enum ReplayCommand {
    Join {
        outbox_tx: mpsc::Sender<ReplayServerMessage>,
        reply: oneshot::Sender<CoreResult<SessionId>>,
    },
    Leave {
        session_id: SessionId,
    },
    PlayEvent {
        generation: u64,
        index: usize,
    },
    CheckDrain {
        generation: u64,
    },
}

struct ReplayRoom {
    app: Arc<AppState>,
    game_id: String,
    events: Vec<GameEvent>,
    sessions: HashMap<SessionId, ReplayOutbox>,
    next_index: usize,
    playback_started: bool,
    playback_generation: u64,
    drain_generation: u64,
    self_tx: mpsc::Sender<ReplayCommand>,
}

pub async fn spawn_replay_room(app: Arc<AppState>, game_id: String) -> CoreResult<ReplayRoomHandle> {
    let events = events::list_events(app.kv.as_ref(), &game_id).await?;

    let (tx, rx) = mpsc::channel(64);
    let room = ReplayRoom {
        app,
        game_id: game_id.clone(),
        events,
        sessions: HashMap::new(),
        next_index: 0,
        playback_started: false,
        playback_generation: 0,
        drain_generation: 0,
        self_tx: tx.clone(),
    };

    let span = tracing::info_span!("room", game_id = %game_id, kind = "replay");
    tokio::spawn(async move { room.run(rx).await }.instrument(span));

    Ok(ReplayRoomHandle { tx })
}

impl ReplayRoom {
    async fn run(mut self, mut rx: mpsc::Receiver<ReplayCommand>) {
        tracing::info!(events = self.events.len(), "replay room started");
        while let Some(cmd) = rx.recv().await {
            match cmd {
                ReplayCommand::Join { outbox_tx, reply } => {
                    let result = self.handle_join(outbox_tx);
                    let _ = reply.send(Ok(result));
                }
                ReplayCommand::Leave { session_id } => self.handle_leave(session_id),
                ReplayCommand::PlayEvent { generation, index } => self.handle_play_event(generation, index),
                ReplayCommand::CheckDrain { generation } => {
                    if self.handle_check_drain(generation) {
                        break;
                    }
                }
            }
        }
        tracing::info!("replay room disposed");
    }

    fn handle_join(&mut self, outbox_tx: mpsc::Sender<ReplayServerMessage>) -> SessionId {
        let session_id = next_session_id();
        let outbox = ReplayOutbox::new(outbox_tx);

        outbox.send(ReplayServerMessage::ReplayInfo { game_id: self.game_id.clone(), total_events: self.events.len() });
        for event in &self.events[..self.next_index] {
            outbox.send(ReplayServerMessage::Event(to_wire(event)));
        }
        if self.next_index == self.events.len() && !self.events.is_empty() {
            outbox.send(ReplayServerMessage::ReplayEnd);
        }

        self.sessions.insert(session_id, outbox);
        self.drain_generation += 1;

        if !self.playback_started {
            self.start_playback();
        }
        session_id
    }

    fn handle_leave(&mut self, session_id: SessionId) {
        self.sessions.remove(&session_id);
        if self.sessions.is_empty() {
            self.drain_generation += 1;
            let generation = self.drain_generation;
            let tx = self.self_tx.clone();
            let grace = std::time::Duration::from_secs(self.app.settings.drain_grace_secs);
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let _ = tx.send(ReplayCommand::CheckDrain { generation }).await;
            });
        }
    }

    fn handle_check_drain(&mut self, generation: u64) -> bool {
        if generation != self.drain_generation || !self.sessions.is_empty() {
            return false;
        }
        self.app.retire_replay(&self.game_id);
        tracing::info!("drain grace expired, disposing replay room");
        true
    }

    fn handle_play_event(&mut self, generation: u64, index: usize) {
        if generation != self.playback_generation {
            return;
        }
        let Some(event) = self.events.get(index) else { return };
        self.broadcast(ReplayServerMessage::Event(to_wire(event)));
        self.next_index = index + 1;
        if self.next_index == self.events.len() {
            self.broadcast(ReplayServerMessage::ReplayEnd);
        }
    }

    /// Normalizes every event's timestamp against the first event's, so
    /// playback always starts at t=0 regardless of when the game was played,
    /// then schedules one `PlayEvent` per entry on its own delay. The
    /// generation guard means a room that somehow restarted playback (it
    /// never does today, but the guard costs nothing) drops stale timers
    /// instead of double-firing.
    fn start_playback(&mut self) {
        self.playback_started = true;
        if self.events.is_empty() {
            return;
        }
        self.playback_generation += 1;
        let generation = self.playback_generation;
        let base_ts = self.events[0].timestamp;
        let offsets: Vec<i64> = self.events.iter().map(|e| (e.timestamp - base_ts).max(0)).collect();
        let tx = self.self_tx.clone();

        tokio::spawn(async move {
            let mut elapsed = 0i64;
            for (index, offset) in offsets.into_iter().enumerate() {
                let delay = (offset - elapsed).max(0);
                if delay > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(delay as u64)).await;
                }
                elapsed = offset;
                if tx.send(ReplayCommand::PlayEvent { generation, index }).await.is_err() {
                    break;
                }
            }
        });
    }

    fn broadcast(&self, message: ReplayServerMessage) {
        for outbox in self.sessions.values() {
            outbox.send(message.clone());
        }
    }
}

fn to_wire(event: &GameEvent) -> ReplayEvent {
    ReplayEvent {
        game_id: event.game_id.clone(),
        player_id: event.player_id.clone(),
        color: event.color.clone(),
        q: event.q,
        r: event.r,
        event_type: event.event_type.as_str().to_string(),
        timestamp: event.timestamp,
    }
}
