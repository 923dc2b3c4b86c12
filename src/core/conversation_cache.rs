// src/core/conversation_cache.rs
//! Process-local conversation cache backed by the conversations table

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::Database;
use crate::database::ConversationRepository;
use crate::types::ChatMessage;

/// Conversation slot of one session; `None` until loaded from the database
type Slot = Arc<Mutex<Option<Vec<ChatMessage>>>>;

/// Write-through cache from session id to its conversation.
///
/// Each session has its own lock, so appends for a session are applied and
/// persisted in order while other sessions proceed. The cached copy is only
/// replaced after the database write succeeded.
#[derive(Clone)]
pub struct ConversationStore {
    db: Database,
    slots: Arc<Mutex<HashMap<i64, Slot>>>,
}

impl ConversationStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Conversation of a session, loading it from the database on a miss
    pub async fn history(&self, session_id: i64) -> Result<Vec<ChatMessage>> {
        let slot = self.slot(session_id).await;
        let mut cached = slot.lock().await;
        self.loaded(&mut cached, session_id).await
    }

    /// Append the user's message, first inserting `system` when the
    /// conversation has no system prompt yet. Returns the full conversation.
    pub async fn record_user_turn(
        &self,
        session_id: i64,
        system: Option<ChatMessage>,
        user: ChatMessage,
    ) -> Result<Vec<ChatMessage>> {
        let slot = self.slot(session_id).await;
        let mut cached = slot.lock().await;

        let mut messages = self.loaded(&mut cached, session_id).await?;
        if let Some(system) = system {
            if !messages.iter().any(ChatMessage::is_system) {
                messages.insert(0, system);
            }
        }
        messages.push(user);

        self.persist(&mut cached, session_id, messages).await
    }

    pub async fn append(&self, session_id: i64, message: ChatMessage) -> Result<()> {
        let slot = self.slot(session_id).await;
        let mut cached = slot.lock().await;

        let mut messages = self.loaded(&mut cached, session_id).await?;
        messages.push(message);

        self.persist(&mut cached, session_id, messages).await?;
        Ok(())
    }

    /// Drop the cached copy; the persisted row is kept
    pub async fn evict(&self, session_id: i64) {
        if self.slots.lock().await.remove(&session_id).is_some() {
            debug!("Evicted conversation cache for session {}", session_id);
        }
    }

    async fn slot(&self, session_id: i64) -> Slot {
        let mut slots = self.slots.lock().await;
        slots.entry(session_id).or_default().clone()
    }

    /// Copy of the cached conversation, filling the slot on first use
    async fn loaded(
        &self,
        cached: &mut Option<Vec<ChatMessage>>,
        session_id: i64,
    ) -> Result<Vec<ChatMessage>> {
        if let Some(messages) = cached.as_ref() {
            return Ok(messages.clone());
        }

        let stored = ConversationRepository::new(self.db.pool())
            .load(session_id)
            .await?
            .unwrap_or_default();
        *cached = Some(stored.clone());
        Ok(stored)
    }

    async fn persist(
        &self,
        cached: &mut Option<Vec<ChatMessage>>,
        session_id: i64,
        messages: Vec<ChatMessage>,
    ) -> Result<Vec<ChatMessage>> {
        ConversationRepository::new(self.db.pool())
            .upsert(session_id, &messages)
            .await?;
        *cached = Some(messages.clone());
        Ok(messages)
    }
}
