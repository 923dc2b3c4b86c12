// src/web/types.rs
use rocket::form::FromForm;
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::{Json, Value};
use rocket::serde::{Deserialize, Serialize};
use rocket::Request;
use tracing::error;

use crate::core::config_manager::UploadSettings;
use crate::types::{ChatMessage, InterviewSession, User, UserAssessment};

pub struct ServerConfig {
    pub uploads: UploadSettings,
}

// Response envelopes

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde", rename_all = "lowercase")]
pub enum ResponseType {
    Data,
    Error,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct DataResponse<T> {
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub success: bool,
    pub message: String,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct StandardErrorResponse {
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub suggestions: Vec<String>,
}

impl<T> DataResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            response_type: ResponseType::Data,
            success: true,
            message: message.into(),
            data,
        }
    }
}

impl StandardErrorResponse {
    pub fn new(error: String, error_code: String, suggestions: Vec<String>) -> Self {
        Self {
            response_type: ResponseType::Error,
            success: false,
            error,
            error_code,
            suggestions,
        }
    }
}

/// Error envelope with its HTTP status
#[derive(Debug)]
pub struct ApiError {
    pub status: Status,
    pub body: StandardErrorResponse,
}

impl ApiError {
    pub fn new(status: Status, error: impl Into<String>, error_code: &str) -> Self {
        Self {
            status,
            body: StandardErrorResponse::new(error.into(), error_code.to_string(), Vec::new()),
        }
    }

    pub fn with_suggestions(mut self, suggestions: &[&str]) -> Self {
        self.body.suggestions = suggestions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn bad_request(error: impl Into<String>, error_code: &str) -> Self {
        Self::new(Status::BadRequest, error, error_code)
    }

    pub fn unauthorized(error: impl Into<String>) -> Self {
        Self::new(Status::Unauthorized, error, "UNAUTHORIZED")
    }

    pub fn forbidden(error: impl Into<String>) -> Self {
        Self::new(Status::Forbidden, error, "FORBIDDEN")
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(Status::NotFound, error, "NOT_FOUND")
    }

    pub fn conflict(error: impl Into<String>, error_code: &str) -> Self {
        Self::new(Status::Conflict, error, error_code)
    }

    /// Log the cause and hide it behind a generic message
    pub fn internal(error: impl Into<String>, cause: anyhow::Error) -> Self {
        let error = error.into();
        error!("{}: {:#}", error, cause);
        Self::new(Status::InternalServerError, error, "INTERNAL_ERROR")
            .with_suggestions(&["Try again in a few moments"])
    }

    pub fn session_not_found() -> Self {
        Self::not_found("Session not found")
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        (self.status, Json(self.body)).respond_to(req)
    }
}

pub type ApiResult<T> = Result<Json<DataResponse<T>>, ApiError>;

// Request bodies. Fields are optional so missing ones get a specific message.

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct SetupRequest {
    pub position: Option<String>,
    pub industry: Option<String>,
    pub style: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ChatMessageRequest {
    pub session_id: Option<Value>,
    pub message: Option<String>,
}

#[derive(FromForm)]
pub struct PersonalizedSetupForm<'f> {
    pub style: Option<String>,
    pub language: Option<String>,
    pub files: Vec<TempFile<'f>>,
}

// Response payloads

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct AuthData {
    pub user: User,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct UserData {
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SessionData {
    pub session: InterviewSession,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SessionsData {
    pub sessions: Vec<InterviewSession>,
}

/// A session with its visible conversation, as shown in the history pages
#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SessionWithConversation {
    #[serde(flatten)]
    pub session: InterviewSession,
    pub conversation: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct HistoryData {
    pub sessions: Vec<SessionWithConversation>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct HistoryEntryData {
    pub session: SessionWithConversation,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ChatHistoryData {
    pub history: Vec<ChatMessage>,
    pub session: InterviewSession,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct EvaluationData {
    pub session_id: i64,
    pub evaluation: String,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct AssessmentData {
    pub assessment: Option<UserAssessment>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct GeneratedAssessmentData {
    pub assessment: Option<UserAssessment>,
    pub total_sessions: usize,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct HealthData {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct InfoData {
    pub app: String,
    pub version: String,
    pub description: String,
}
