// src/web/handlers/interview_handlers.rs
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::auth::AuthenticatedUser;
use crate::core::Database;
use crate::database::{ConversationRepository, SessionRepository};
use crate::interview_ai::ChatServices;
use crate::types::conversation::without_system;
use crate::types::{
    Industry, InterviewMode, InterviewSession, InterviewStyle, JobLevel, Language,
    NewInterviewSession,
};
use crate::utils::non_empty;
use crate::web::types::{
    ApiError, ApiResult, DataResponse, HistoryData, HistoryEntryData, SessionData,
    SessionWithConversation, SessionsData, SetupRequest,
};

/// Load a session that belongs to the caller, 404 otherwise
pub async fn owned_session(
    db: &Database,
    session_id: i64,
    user_id: i64,
) -> Result<InterviewSession, ApiError> {
    SessionRepository::new(db.pool())
        .find_for_user(session_id, user_id)
        .await
        .map_err(|e| ApiError::internal("Failed to load session", e))?
        .ok_or_else(ApiError::session_not_found)
}

pub async fn setup_handler(
    request: Json<SetupRequest>,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> Result<(Status, Json<DataResponse<SessionData>>), ApiError> {
    let fields = (
        non_empty(request.position.as_deref()),
        non_empty(request.industry.as_deref()),
        non_empty(request.style.as_deref()),
        non_empty(request.language.as_deref()),
    );
    let (Some(position), Some(industry), Some(style), Some(language)) = fields else {
        warn!("Interview setup by {} rejected: missing fields", auth.email());
        return Err(ApiError::bad_request(
            "Please fill in all fields",
            "MISSING_FIELDS",
        ));
    };

    let position = position
        .parse::<JobLevel>()
        .map_err(|_| ApiError::bad_request("Invalid position", "INVALID_POSITION"))?;
    let industry = industry
        .parse::<Industry>()
        .map_err(|_| ApiError::bad_request("Invalid industry", "INVALID_INDUSTRY"))?;
    let style = style
        .parse::<InterviewStyle>()
        .map_err(|_| ApiError::bad_request("Invalid interview style", "INVALID_STYLE"))?;
    let language = language
        .parse::<Language>()
        .map_err(|_| ApiError::bad_request("Invalid language", "INVALID_LANGUAGE"))?;

    let session = SessionRepository::new(db.pool())
        .create(&NewInterviewSession {
            user_id: auth.id(),
            mode: InterviewMode::Standard,
            position: Some(position.as_str().to_string()),
            industry: Some(industry.as_str().to_string()),
            style,
            language,
            uploaded_files_info: None,
            custom_questions: None,
        })
        .await
        .map_err(|e| ApiError::internal("Failed to create interview session", e))?;

    info!(
        "Interview session {} created for {} ({} / {})",
        session.id,
        auth.email(),
        position.as_str(),
        industry.as_str()
    );

    Ok((
        Status::Created,
        Json(DataResponse::success(
            "Interview session created",
            SessionData { session },
        )),
    ))
}

pub async fn list_sessions_handler(
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<SessionsData> {
    let sessions = SessionRepository::new(db.pool())
        .list_for_user(auth.id())
        .await
        .map_err(|e| ApiError::internal("Failed to load sessions", e))?;

    Ok(Json(DataResponse::success(
        format!("{} sessions", sessions.len()),
        SessionsData { sessions },
    )))
}

pub async fn get_session_handler(
    session_id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<SessionData> {
    let session = owned_session(db, session_id, auth.id()).await?;
    Ok(Json(DataResponse::success("Session found", SessionData { session })))
}

pub async fn history_handler(
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<HistoryData> {
    let sessions = SessionRepository::new(db.pool())
        .list_for_user(auth.id())
        .await
        .map_err(|e| ApiError::internal("Failed to load interview history", e))?;

    let mut conversations: HashMap<i64, _> = ConversationRepository::new(db.pool())
        .load_for_user(auth.id())
        .await
        .map_err(|e| ApiError::internal("Failed to load interview history", e))?;

    let sessions: Vec<SessionWithConversation> = sessions
        .into_iter()
        .map(|session| {
            let conversation = conversations
                .remove(&session.id)
                .map(|messages| without_system(&messages))
                .unwrap_or_default();
            SessionWithConversation {
                session,
                conversation,
            }
        })
        .collect();

    Ok(Json(DataResponse::success(
        format!("{} sessions", sessions.len()),
        HistoryData { sessions },
    )))
}

pub async fn history_entry_handler(
    session_id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> ApiResult<HistoryEntryData> {
    let session = owned_session(db, session_id, auth.id()).await?;
    let messages = chat
        .conversations
        .history(session.id)
        .await
        .map_err(|e| ApiError::internal("Failed to load conversation", e))?;

    Ok(Json(DataResponse::success(
        "Session found",
        HistoryEntryData {
            session: SessionWithConversation {
                session,
                conversation: without_system(&messages),
            },
        },
    )))
}
