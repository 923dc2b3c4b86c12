// src/web/realtime.rs
//! WebSocket channel: `{ "event": name, "data": {...} }` frames relayed
//! through per-session rooms

use rocket::futures::{SinkExt, StreamExt};
use rocket_ws::{Channel, Message, WebSocket};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::AuthConfig;
use crate::core::rooms::room_name;
use crate::core::Database;
use crate::database::{SessionRepository, UserRepository};
use crate::interview_ai::turns::{begin_turn, end_session, evaluate_session, finish_turn};
use crate::interview_ai::ChatServices;
use crate::types::conversation::without_system;
use crate::types::events::{session_id_from, ClientEvent, SendMessage, ServerEvent, SessionRef};
use crate::types::{ChatMessage, InterviewSession, SessionStatus};
use crate::utils::non_empty;

/// Upgrade the request and serve one connection until it closes
pub fn open_channel(
    ws: WebSocket,
    db: Database,
    auth: AuthConfig,
    services: ChatServices,
) -> Channel<'static> {
    ws.channel(move |stream| {
        Box::pin(async move {
            let (mut sink, mut source) = stream.split();
            let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();
            let mut connection = Connection::new(db, auth, services, outbound);
            connection.greet();

            let writer = tokio::spawn(async move {
                while let Some(event) = outbound_rx.recv().await {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode event: {}", e);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = sink.close().await;
            });

            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => connection.handle_frame(&text).await,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket read failed: {}", e);
                        break;
                    }
                }
            }

            connection.close().await;
            drop(connection);
            let _ = writer.await;
            debug!("WebSocket connection closed");
            Ok(())
        })
    })
}

/// State of one client connection: its outbound queue and the rooms it
/// listens to
pub struct Connection {
    db: Database,
    auth: AuthConfig,
    services: ChatServices,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    subscriptions: HashMap<i64, JoinHandle<()>>,
}

impl Connection {
    pub fn new(
        db: Database,
        auth: AuthConfig,
        services: ChatServices,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            db,
            auth,
            services,
            outbound,
            subscriptions: HashMap::new(),
        }
    }

    pub fn greet(&self) {
        self.reply(ServerEvent::ConnectionResponse {
            status: "connected".to_string(),
            message: "Connected to TrueMirror interview server".to_string(),
        });
    }

    pub async fn handle_frame(&mut self, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.dispatch(event).await,
            Err(e) => {
                warn!("Malformed client frame: {}", e);
                self.reply(ServerEvent::error("Unknown or malformed event"));
            }
        }
    }

    pub async fn dispatch(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::JoinSession(data) => self.join_session(data).await,
            ClientEvent::SendMessage(data) => self.send_message(data).await,
            ClientEvent::EndSession(data) => self.end_session(data).await,
            ClientEvent::EvaluateSession(data) => self.evaluate_session(data).await,
        }
    }

    /// Stop every room forwarder of this connection
    pub async fn close(&mut self) {
        let rooms: Vec<i64> = self.subscriptions.keys().copied().collect();
        for session_id in rooms {
            self.leave(session_id).await;
        }
    }

    fn reply(&self, event: ServerEvent) {
        if self.outbound.send(event).is_err() {
            debug!("Dropped event for a closed connection");
        }
    }

    async fn join_session(&mut self, data: SessionRef) {
        let (Some(session_id), Some(token)) = (session_id_from(data.session_id.as_ref()), data.token)
        else {
            self.reply(ServerEvent::error("Missing session_id or token"));
            return;
        };

        let user_id = match self.user_from_token(&token).await {
            Ok(user_id) => user_id,
            Err(message) => return self.reply(ServerEvent::error(message)),
        };

        let session = match SessionRepository::new(self.db.pool()).find(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return self.reply(ServerEvent::error("Session not found")),
            Err(e) => {
                error!("Failed to load session {}: {:#}", session_id, e);
                return self.reply(ServerEvent::error("Failed to join session"));
            }
        };
        if session.user_id != user_id {
            return self.reply(ServerEvent::error("Unauthorized access to session"));
        }

        let history = match self.services.conversations.history(session_id).await {
            Ok(history) => without_system(&history),
            Err(e) => {
                error!("Failed to load conversation {}: {:#}", session_id, e);
                return self.reply(ServerEvent::error("Failed to join session"));
            }
        };

        self.join(session_id).await;
        info!("User {} joined {}", user_id, room_name(session_id));

        self.reply(ServerEvent::JoinedSession {
            session_id,
            room: room_name(session_id),
            conversation_history: history,
            message: "Joined the interview room".to_string(),
        });
    }

    async fn send_message(&mut self, data: SendMessage) {
        let session_id = session_id_from(data.session_id.as_ref());
        let message = non_empty(data.message.as_deref());
        let (Some(session_id), Some(message), Some(token)) = (session_id, message, data.token)
        else {
            self.reply(ServerEvent::error("Missing required fields"));
            return;
        };

        let Some(session) = self.owned_session(session_id, &token).await else {
            return;
        };

        self.join(session_id).await;

        let turn = match begin_turn(&self.db, &self.services, &session, &message).await {
            Ok(turn) => turn,
            Err(e) => {
                error!("Failed to record message for session {}: {:#}", session_id, e);
                return self.reply(ServerEvent::error(format!("Failed to send message: {}", e)));
            }
        };

        let rooms = &self.services.rooms;
        rooms
            .publish(session_id, ServerEvent::UserMessage(turn.user_message.clone()))
            .await;
        rooms
            .publish(session_id, ServerEvent::AiTyping { typing: true })
            .await;

        let reply = match self.relay_reply(session_id, &turn.conversation).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Chat completion failed for session {}: {:#}", session_id, e);
                rooms
                    .publish(session_id, ServerEvent::AiTyping { typing: false })
                    .await;
                return self.reply(ServerEvent::error(format!("Failed to send message: {}", e)));
            }
        };

        match finish_turn(&self.services, session_id, reply).await {
            Ok(message) => {
                rooms
                    .publish(session_id, ServerEvent::AiTyping { typing: false })
                    .await;
                rooms
                    .publish(
                        session_id,
                        ServerEvent::AiComplete {
                            timestamp: message.timestamp,
                            message,
                        },
                    )
                    .await;
            }
            Err(e) => {
                error!("Failed to store reply for session {}: {:#}", session_id, e);
                rooms
                    .publish(session_id, ServerEvent::AiTyping { typing: false })
                    .await;
                self.reply(ServerEvent::error(format!("Failed to send message: {}", e)));
            }
        }
    }

    /// Publish every upstream chunk to the room and return the whole reply
    async fn relay_reply(
        &self,
        session_id: i64,
        conversation: &[ChatMessage],
    ) -> anyhow::Result<String> {
        let mut tokens = self.services.interviewer.stream_reply(conversation).await?;
        let mut reply = String::new();

        while let Some(chunk) = tokens.next().await {
            let chunk = chunk?;
            reply.push_str(&chunk);
            self.services
                .rooms
                .publish(session_id, ServerEvent::AiChunk { chunk })
                .await;
            if !self.services.chunk_delay.is_zero() {
                tokio::time::sleep(self.services.chunk_delay).await;
            }
        }
        Ok(reply)
    }

    async fn end_session(&mut self, data: SessionRef) {
        let (Some(session_id), Some(token)) = (session_id_from(data.session_id.as_ref()), data.token)
        else {
            self.reply(ServerEvent::error("Missing session_id or token"));
            return;
        };

        if self.owned_session(session_id, &token).await.is_none() {
            return;
        }

        let session = match end_session(&self.db, &self.services, session_id).await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to end session {}: {:#}", session_id, e);
                return self.reply(ServerEvent::error(format!("Failed to end session: {}", e)));
            }
        };

        let ended = ServerEvent::SessionEnded {
            session_id,
            status: SessionStatus::Completed.to_string(),
        };
        self.leave(session_id).await;
        self.services.rooms.publish(session_id, ended.clone()).await;
        self.services.rooms.prune(session_id).await;
        self.reply(ended);

        info!("Session {} ended over the real-time channel", session.id);
    }

    async fn evaluate_session(&mut self, data: SessionRef) {
        let (Some(session_id), Some(token)) = (session_id_from(data.session_id.as_ref()), data.token)
        else {
            self.reply(ServerEvent::error("Missing session_id or token"));
            return;
        };

        let Some(session) = self.owned_session(session_id, &token).await else {
            return;
        };

        self.join(session_id).await;

        match evaluate_session(&self.db, &self.services, &session).await {
            Ok(evaluation) => {
                self.services
                    .rooms
                    .publish(
                        session_id,
                        ServerEvent::SessionEvaluated {
                            session_id,
                            evaluation,
                        },
                    )
                    .await;
                info!("Session {} evaluated", session_id);
            }
            Err(e) => {
                error!("Failed to evaluate session {}: {:#}", session_id, e);
                self.reply(ServerEvent::error(format!("Failed to evaluate session: {}", e)));
            }
        }
    }

    /// Resolve the token to an active user id, or the error message to send
    async fn user_from_token(&self, token: &str) -> Result<i64, String> {
        let user_id = self
            .auth
            .verify_token(token)
            .map_err(|e| format!("Invalid token: {}", e))?;

        match UserRepository::new(self.db.pool()).find_by_id(user_id).await {
            Ok(Some(user)) if user.is_active => Ok(user_id),
            Ok(_) => Err("Unauthorized".to_string()),
            Err(e) => {
                error!("Failed to load user {}: {:#}", user_id, e);
                Err("Unauthorized".to_string())
            }
        }
    }

    /// The session if the token's user owns it; otherwise the error is sent
    async fn owned_session(&self, session_id: i64, token: &str) -> Option<InterviewSession> {
        let user_id = match self.user_from_token(token).await {
            Ok(user_id) => user_id,
            Err(message) => {
                self.reply(ServerEvent::error(message));
                return None;
            }
        };

        match SessionRepository::new(self.db.pool())
            .find_for_user(session_id, user_id)
            .await
        {
            Ok(Some(session)) => Some(session),
            Ok(None) => {
                warn!("User {} denied access to session {}", user_id, session_id);
                self.reply(ServerEvent::error("Unauthorized"));
                None
            }
            Err(e) => {
                error!("Failed to load session {}: {:#}", session_id, e);
                self.reply(ServerEvent::error("Unauthorized"));
                None
            }
        }
    }

    /// Forward the room's events to this connection
    async fn join(&mut self, session_id: i64) {
        if self.subscriptions.contains_key(&session_id) {
            return;
        }

        let mut events = self.services.rooms.subscribe(session_id).await;
        let outbound = self.outbound.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if outbound.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Connection lagged behind {} by {} events", room_name(session_id), skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.subscriptions.insert(session_id, forwarder);
    }

    async fn leave(&mut self, session_id: i64) {
        if let Some(forwarder) = self.subscriptions.remove(&session_id) {
            forwarder.abort();
            let _ = forwarder.await;
            self.services.rooms.prune(session_id).await;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for forwarder in self.subscriptions.values() {
            forwarder.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config_manager::AuthSettings;
    use crate::interview_ai::interviewer::testing::ScriptedCompletion;
    use crate::interview_ai::Interviewer;
    use crate::types::{InterviewMode, InterviewStyle, Language, NewInterviewSession, Role};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        _dir: tempfile::TempDir,
        db: Database,
        auth: AuthConfig,
        services: ChatServices,
        session_id: i64,
        token: String,
    }

    async fn harness(llm: ScriptedCompletion) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("ws.db")).await.unwrap();
        let user = UserRepository::new(db.pool())
            .create("ws@example.com", "hash", "Socket User")
            .await
            .unwrap();
        let session = SessionRepository::new(db.pool())
            .create(&NewInterviewSession {
                user_id: user.id,
                mode: InterviewMode::Standard,
                position: Some("Senior".to_string()),
                industry: Some("Sales".to_string()),
                style: InterviewStyle::Serious,
                language: Language::En,
                uploaded_files_info: None,
                custom_questions: None,
            })
            .await
            .unwrap();

        let auth = AuthConfig::new(&AuthSettings {
            jwt_secret: "ws-secret".to_string(),
            token_ttl_hours: 1,
            bcrypt_cost: 4,
        });
        let token = auth.issue_token(user.id).unwrap();
        let services = ChatServices::new(
            db.clone(),
            Interviewer::new(Arc::new(llm)),
            Duration::from_millis(0),
        );

        Harness {
            _dir: dir,
            db,
            auth,
            services,
            session_id: session.id,
            token,
        }
    }

    fn connect(h: &Harness) -> (Connection, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new(h.db.clone(), h.auth.clone(), h.services.clone(), tx);
        (connection, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    fn event(raw: serde_json::Value) -> ClientEvent {
        serde_json::from_value(raw).unwrap()
    }

    #[tokio::test]
    async fn test_join_session_replies_with_history() {
        let h = harness(ScriptedCompletion::default()).await;
        let (mut connection, mut rx) = connect(&h);
        connection.greet();

        assert!(matches!(
            next_event(&mut rx).await,
            ServerEvent::ConnectionResponse { .. }
        ));

        connection
            .dispatch(event(json!({
                "event": "join_session",
                "data": {"session_id": h.session_id.to_string(), "token": h.token}
            })))
            .await;

        match next_event(&mut rx).await {
            ServerEvent::JoinedSession {
                session_id,
                room,
                conversation_history,
                ..
            } => {
                assert_eq!(session_id, h.session_id);
                assert_eq!(room, format!("session_{}", h.session_id));
                assert!(conversation_history.is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(h.services.rooms.member_count(h.session_id).await, 1);

        connection.close().await;
        assert_eq!(h.services.rooms.member_count(h.session_id).await, 0);
    }

    #[tokio::test]
    async fn test_join_errors_go_to_requester() {
        let h = harness(ScriptedCompletion::default()).await;
        let (mut connection, mut rx) = connect(&h);

        connection
            .dispatch(event(json!({"event": "join_session", "data": {"session_id": h.session_id}})))
            .await;
        assert_eq!(
            next_event(&mut rx).await,
            ServerEvent::error("Missing session_id or token")
        );

        connection
            .dispatch(event(json!({
                "event": "join_session",
                "data": {"session_id": h.session_id, "token": "garbage"}
            })))
            .await;
        match next_event(&mut rx).await {
            ServerEvent::Error { message } => assert!(message.starts_with("Invalid token: ")),
            other => panic!("unexpected event {:?}", other),
        }

        connection
            .dispatch(event(json!({
                "event": "join_session",
                "data": {"session_id": 9999, "token": h.token}
            })))
            .await;
        assert_eq!(next_event(&mut rx).await, ServerEvent::error("Session not found"));

        let stranger = UserRepository::new(h.db.pool())
            .create("other@example.com", "hash", "Other")
            .await
            .unwrap();
        let stranger_token = h.auth.issue_token(stranger.id).unwrap();
        connection
            .dispatch(event(json!({
                "event": "join_session",
                "data": {"session_id": h.session_id, "token": stranger_token}
            })))
            .await;
        assert_eq!(
            next_event(&mut rx).await,
            ServerEvent::error("Unauthorized access to session")
        );
    }

    #[tokio::test]
    async fn test_send_message_streams_reply_to_room() {
        let h = harness(ScriptedCompletion::with_chunks(&["Hello ", "Lan, ", "tell me more."])).await;
        let (mut connection, mut rx) = connect(&h);

        connection
            .dispatch(event(json!({
                "event": "send_message",
                "data": {"session_id": h.session_id, "message": " Hi there ", "token": h.token}
            })))
            .await;

        match next_event(&mut rx).await {
            ServerEvent::UserMessage(message) => {
                assert_eq!(message.role, Role::User);
                assert_eq!(message.content, "Hi there");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(next_event(&mut rx).await, ServerEvent::AiTyping { typing: true });
        for expected in ["Hello ", "Lan, ", "tell me more."] {
            assert_eq!(
                next_event(&mut rx).await,
                ServerEvent::AiChunk {
                    chunk: expected.to_string()
                }
            );
        }
        assert_eq!(next_event(&mut rx).await, ServerEvent::AiTyping { typing: false });
        match next_event(&mut rx).await {
            ServerEvent::AiComplete { message, timestamp } => {
                assert_eq!(message.content, "Hello Lan, tell me more.");
                assert_eq!(message.timestamp, timestamp);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let history = h.services.conversations.history(h.session_id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Role::System);

        let session = SessionRepository::new(h.db.pool())
            .find(h.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_send_message_requires_fields() {
        let h = harness(ScriptedCompletion::default()).await;
        let (mut connection, mut rx) = connect(&h);

        connection
            .dispatch(event(json!({
                "event": "send_message",
                "data": {"session_id": h.session_id, "message": "   ", "token": h.token}
            })))
            .await;
        assert_eq!(
            next_event(&mut rx).await,
            ServerEvent::error("Missing required fields")
        );
    }

    #[tokio::test]
    async fn test_evaluate_then_end_session() {
        let h = harness(ScriptedCompletion::with_replies(&["**Score: 9/10**"])).await;
        let (mut connection, mut rx) = connect(&h);

        connection
            .dispatch(event(json!({
                "event": "evaluate_session",
                "data": {"session_id": h.session_id, "token": h.token}
            })))
            .await;
        assert_eq!(
            next_event(&mut rx).await,
            ServerEvent::SessionEvaluated {
                session_id: h.session_id,
                evaluation: "**Score: 9/10**".to_string()
            }
        );

        connection
            .dispatch(event(json!({
                "event": "end_session",
                "data": {"session_id": h.session_id, "token": h.token}
            })))
            .await;
        assert_eq!(
            next_event(&mut rx).await,
            ServerEvent::SessionEnded {
                session_id: h.session_id,
                status: "completed".to_string()
            }
        );
        assert_eq!(h.services.rooms.member_count(h.session_id).await, 0);

        let session = SessionRepository::new(h.db.pool())
            .find(h.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.evaluation.as_deref(), Some("**Score: 9/10**"));
    }
}
