//! Event log (spec §3 "Event", §4.3 `saveGameEvent`). `games:<gameId>:events`
//! list, `LPUSH` + `LTRIM 0 (cap-1)`, read back with `LRANGE`.
//!
//! Insertion order must be preserved (spec §3). `LPUSH` prepends, so the
//! list is stored most-recent-first; every read path here reverses it back
//! to chronological order before handing events to a caller — replay and the
//! history HTTP endpoint both depend on that ordering.

use crate::error::CoreResult;
use crate::kv::KvStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Start,
    Capture,
    #[serde(rename = "auto-capture")]
    AutoCapture,
    Upgrade,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Start => "start",
            EventType::Capture => "capture",
            EventType::AutoCapture => "auto-capture",
            EventType::Upgrade => "upgrade",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    pub game_id: String,
    pub player_id: String,
    pub color: String,
    pub q: i32,
    pub r: i32,
    pub event_type: EventType,
    pub timestamp: i64,
}

fn events_key(game_id: &str) -> String {
    format!("games:{game_id}:events")
}

/// Appends an event, trimming the log to `cap` entries (oldest dropped).
pub async fn save_game_event(kv: &dyn KvStore, event: &GameEvent, cap: usize) -> CoreResult<()> {
    let key = events_key(&event.game_id);
    kv.list_lpush(&key, serde_json::to_string(event)?).await?;
    let cap = cap.max(1);
    kv.list_ltrim(&key, 0, cap as isize - 1).await
}

/// All events for a game, oldest first, as insertion order requires.
pub async fn list_events(kv: &dyn KvStore, game_id: &str) -> CoreResult<Vec<GameEvent>> {
    let raw = kv.list_lrange(&events_key(game_id), 0, -1).await?;
    let mut events: Vec<GameEvent> = raw
        .iter()
        .filter_map(|v| serde_json::from_str(v).ok())
        .collect();
    events.reverse();
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn event(q: i32, ts: i64) -> GameEvent {
        GameEvent {
            game_id: "g1".into(),
            player_id: "p1".into(),
            color: "#fff".into(),
            q,
            r: 0,
            event_type: EventType::Capture,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn events_replay_in_insertion_order() {
        let kv = MemoryKv::new();
        for i in 0..5 {
            save_game_event(&kv, &event(i, i as i64), 10_000).await.unwrap();
        }
        let events = list_events(&kv, "g1").await.unwrap();
        let qs: Vec<i32> = events.iter().map(|e| e.q).collect();
        assert_eq!(qs, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn log_is_capped_and_drops_the_oldest() {
        let kv = MemoryKv::new();
        for i in 0..5 {
            save_game_event(&kv, &event(i, i as i64), 3).await.unwrap();
        }
        let events = list_events(&kv, "g1").await.unwrap();
        let qs: Vec<i32> = events.iter().map(|e| e.q).collect();
        assert_eq!(qs, vec![2, 3, 4]);
    }
}
