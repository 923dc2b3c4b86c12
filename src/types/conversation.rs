// src/types/conversation.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One persisted turn of an interview conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Drop system prompts before handing a conversation to the frontend
pub fn without_system(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages.iter().filter(|m| !m.is_system()).cloned().collect()
}

pub fn has_system_prompt(messages: &[ChatMessage]) -> bool {
    messages.iter().any(ChatMessage::is_system)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_blob_format() {
        let raw = r#"[
            {"role": "system", "content": "You are an interviewer", "timestamp": "2026-01-05T08:00:00+00:00"},
            {"role": "user", "content": "Xin chào", "timestamp": "2026-01-05T08:00:01.250+00:00"}
        ]"#;

        let messages: Vec<ChatMessage> = serde_json::from_str(raw).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(has_system_prompt(&messages));

        let visible = without_system(&messages);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].role, Role::User);
        assert_eq!(visible[0].content, "Xin chào");
    }
}
