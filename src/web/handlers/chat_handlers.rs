// src/web/handlers/chat_handlers.rs
use rocket::futures::StreamExt;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::{json, Json};
use rocket::State;
use tracing::{error, info};

use crate::auth::AuthenticatedUser;
use crate::core::Database;
use crate::interview_ai::turns::{begin_turn, end_session, evaluate_session, finish_turn};
use crate::interview_ai::ChatServices;
use crate::types::conversation::without_system;
use crate::types::events::session_id_from;
use crate::utils::non_empty;
use crate::web::handlers::interview_handlers::owned_session;
use crate::web::types::{
    ApiError, ApiResult, ChatHistoryData, ChatMessageRequest, DataResponse, EvaluationData,
    SessionData,
};

fn error_event(message: &str) -> Event {
    Event::json(&json!({ "error": message, "done": true }))
}

/// Run one chat turn and relay the reply as server-sent events
pub async fn stream_message_handler(
    request: Json<ChatMessageRequest>,
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> Result<EventStream![], ApiError> {
    let session_id = session_id_from(request.session_id.as_ref());
    let message = non_empty(request.message.as_deref());
    let (Some(session_id), Some(message)) = (session_id, message) else {
        return Err(ApiError::bad_request(
            "session_id and message are required",
            "MISSING_FIELDS",
        ));
    };

    let session = owned_session(db, session_id, auth.id()).await?;
    let turn = begin_turn(db, chat, &session, &message)
        .await
        .map_err(|e| ApiError::internal("Failed to record message", e))?;

    info!("Streaming reply for session {} ({})", session_id, auth.email());

    let services = chat.inner().clone();
    Ok(EventStream! {
        match services.interviewer.stream_reply(&turn.conversation).await {
            Err(e) => {
                error!("Chat completion failed for session {}: {:#}", session_id, e);
                yield error_event(&e.to_string());
            }
            Ok(mut tokens) => {
                let mut reply = String::new();
                let mut failure = None;
                while let Some(item) = tokens.next().await {
                    match item {
                        Ok(chunk) => {
                            reply.push_str(&chunk);
                            yield Event::json(&json!({ "chunk": chunk, "done": false }));
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }

                let outcome = match failure {
                    Some(e) => Err(e),
                    None => finish_turn(&services, session_id, reply).await,
                };
                match outcome {
                    Ok(message) => {
                        yield Event::json(&json!({
                            "chunk": "",
                            "done": true,
                            "timestamp": message.timestamp,
                        }));
                    }
                    Err(e) => {
                        error!("Streaming failed for session {}: {:#}", session_id, e);
                        yield error_event(&e.to_string());
                    }
                }
            }
        }
    })
}

pub async fn chat_history_handler(
    session_id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> ApiResult<ChatHistoryData> {
    let session = owned_session(db, session_id, auth.id()).await?;
    let messages = chat
        .conversations
        .history(session_id)
        .await
        .map_err(|e| ApiError::internal("Failed to load conversation", e))?;

    Ok(Json(DataResponse::success(
        "Chat history",
        ChatHistoryData {
            history: without_system(&messages),
            session,
        },
    )))
}

pub async fn end_session_handler(
    session_id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> ApiResult<SessionData> {
    owned_session(db, session_id, auth.id()).await?;
    let session = end_session(db, chat, session_id)
        .await
        .map_err(|e| ApiError::internal("Failed to end session", e))?;

    Ok(Json(DataResponse::success(
        "Interview session ended",
        SessionData { session },
    )))
}

pub async fn evaluate_session_handler(
    session_id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> ApiResult<EvaluationData> {
    let session = owned_session(db, session_id, auth.id()).await?;
    let evaluation = evaluate_session(db, chat, &session)
        .await
        .map_err(|e| ApiError::internal("Failed to evaluate session", e))?;

    Ok(Json(DataResponse::success(
        "Interview evaluated",
        EvaluationData {
            session_id,
            evaluation,
        },
    )))
}
