// src/types/events.rs
//! Frames of the real-time channel: `{ "event": name, "data": {...} }`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ChatMessage;

/// Events sent by the browser. Fields are optional so a missing one can be
/// reported as an `error` event instead of a decode failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinSession(SessionRef),
    SendMessage(SendMessage),
    EndSession(SessionRef),
    EvaluateSession(SessionRef),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionRef {
    #[serde(default)]
    pub session_id: Option<Value>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessage {
    #[serde(default)]
    pub session_id: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ConnectionResponse {
        status: String,
        message: String,
    },
    JoinedSession {
        session_id: i64,
        room: String,
        conversation_history: Vec<ChatMessage>,
        message: String,
    },
    /// The stored user turn: `{ role, content, timestamp }`
    UserMessage(ChatMessage),
    AiTyping {
        typing: bool,
    },
    AiChunk {
        chunk: String,
    },
    AiComplete {
        message: ChatMessage,
        timestamp: DateTime<Utc>,
    },
    SessionEnded {
        session_id: i64,
        status: String,
    },
    SessionEvaluated {
        session_id: i64,
        evaluation: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

/// Accept a session id sent either as a JSON number or a numeric string
pub fn session_id_from(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_decoding() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "send_message",
            "data": {"session_id": "12", "message": "Hi", "token": "t"}
        }))
        .unwrap();

        match event {
            ClientEvent::SendMessage(send) => {
                assert_eq!(session_id_from(send.session_id.as_ref()), Some(12));
                assert_eq!(send.message.as_deref(), Some("Hi"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let join: ClientEvent =
            serde_json::from_value(json!({"event": "join_session", "data": {}})).unwrap();
        assert!(matches!(join, ClientEvent::JoinSession(SessionRef { session_id: None, token: None })));
    }

    #[test]
    fn test_server_event_frame_shape() {
        let value = serde_json::to_value(ServerEvent::AiTyping { typing: true }).unwrap();
        assert_eq!(value, json!({"event": "ai_typing", "data": {"typing": true}}));

        let value = serde_json::to_value(ServerEvent::UserMessage(ChatMessage::user("Hi"))).unwrap();
        assert_eq!(value["event"], "user_message");
        assert_eq!(value["data"]["role"], "user");
        assert_eq!(value["data"]["content"], "Hi");

        let value = serde_json::to_value(ServerEvent::error("Session not found")).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["message"], "Session not found");
    }

    #[test]
    fn test_session_id_rejects_non_numeric() {
        assert_eq!(session_id_from(Some(&json!(7))), Some(7));
        assert_eq!(session_id_from(Some(&json!("abc"))), None);
        assert_eq!(session_id_from(Some(&json!(null))), None);
        assert_eq!(session_id_from(None), None);
    }
}
