// src/core/rooms.rs
//! Per-session broadcast rooms for the real-time channel

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::types::events::ServerEvent;

const ROOM_CAPACITY: usize = 256;

pub fn room_name(session_id: i64) -> String {
    format!("session_{}", session_id)
}

#[derive(Clone, Default)]
pub struct RoomHub {
    rooms: Arc<Mutex<HashMap<i64, broadcast::Sender<ServerEvent>>>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the room of a session, creating it on first use
    pub async fn subscribe(&self, session_id: i64) -> broadcast::Receiver<ServerEvent> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Deliver an event to every member of the room. Returns how many received it.
    pub async fn publish(&self, session_id: i64, event: ServerEvent) -> usize {
        let rooms = self.rooms.lock().await;
        match rooms.get(&session_id) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop the room once nobody listens any more
    pub async fn prune(&self, session_id: i64) {
        let mut rooms = self.rooms.lock().await;
        if rooms
            .get(&session_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            rooms.remove(&session_id);
            debug!("Closed room {}", room_name(session_id));
        }
    }

    pub async fn member_count(&self, session_id: i64) -> usize {
        let rooms = self.rooms.lock().await;
        rooms
            .get(&session_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}
