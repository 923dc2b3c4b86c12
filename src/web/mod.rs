// src/web/mod.rs

pub mod handlers;
pub mod realtime;
pub mod types;

pub use handlers::*;
pub use types::*;

use crate::auth::{AuthConfig, AuthFailure, AuthenticatedUser};
use crate::core::llm_client::{AzureOpenAiClient, ChatCompletion};
use crate::core::{ConfigManager, Database};
use crate::interview_ai::{ChatServices, Interviewer};
use anyhow::Result;
use rocket::data::{Limits, ToByteUnit};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::form::Form;
use rocket::http::{Header, Status};
use rocket::response::stream::EventStream;
use rocket::serde::json::Json;
use rocket::{catchers, get, options, post, routes, Build, Request, Response, Rocket, State};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

// CORS Fairing
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "Add CORS headers to responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "POST, GET, OPTIONS",
        ));
        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Authorization, Content-Type",
        ));
    }
}

// Auth

#[post("/auth/register", data = "<request>")]
pub async fn register(
    request: Json<RegisterRequest>,
    auth_config: &State<AuthConfig>,
    db: &State<Database>,
) -> Result<(Status, Json<DataResponse<AuthData>>), ApiError> {
    handlers::register_handler(request, auth_config, db).await
}

#[post("/auth/login", data = "<request>")]
pub async fn login(
    request: Json<LoginRequest>,
    auth_config: &State<AuthConfig>,
    db: &State<Database>,
) -> ApiResult<AuthData> {
    handlers::login_handler(request, auth_config, db).await
}

#[get("/auth/me")]
pub async fn me(auth: AuthenticatedUser) -> ApiResult<UserData> {
    handlers::me_handler(auth).await
}

// Interview sessions

#[post("/interview/setup", data = "<request>")]
pub async fn setup_interview(
    request: Json<SetupRequest>,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> Result<(Status, Json<DataResponse<SessionData>>), ApiError> {
    handlers::setup_handler(request, auth, db).await
}

#[post("/interview/setup/personalized", data = "<form>")]
pub async fn setup_personalized_interview(
    form: Form<PersonalizedSetupForm<'_>>,
    auth: AuthenticatedUser,
    config: &State<ServerConfig>,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> Result<(Status, Json<DataResponse<SessionData>>), ApiError> {
    handlers::personalized_setup_handler(form, auth, config, db, chat).await
}

#[get("/interview/sessions")]
pub async fn list_sessions(auth: AuthenticatedUser, db: &State<Database>) -> ApiResult<SessionsData> {
    handlers::list_sessions_handler(auth, db).await
}

#[get("/interview/session/<session_id>")]
pub async fn get_session(
    session_id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<SessionData> {
    handlers::get_session_handler(session_id, auth, db).await
}

#[get("/interview/history")]
pub async fn interview_history(
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<HistoryData> {
    handlers::history_handler(auth, db).await
}

#[get("/interview/history/<session_id>")]
pub async fn interview_history_entry(
    session_id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> ApiResult<HistoryEntryData> {
    handlers::history_entry_handler(session_id, auth, db, chat).await
}

#[get("/interview/history/assessment")]
pub async fn get_assessment(
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<AssessmentData> {
    handlers::get_assessment_handler(auth, db).await
}

#[post("/interview/history/generate-assessment")]
pub async fn generate_assessment(
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> ApiResult<GeneratedAssessmentData> {
    handlers::generate_assessment_handler(auth, db, chat).await
}

// Chat

#[post("/chat/message/stream", data = "<request>")]
pub async fn stream_message(
    request: Json<ChatMessageRequest>,
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> Result<EventStream![], ApiError> {
    handlers::stream_message_handler(request, auth, db, chat).await
}

#[get("/chat/history/<session_id>")]
pub async fn chat_history(
    session_id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> ApiResult<ChatHistoryData> {
    handlers::chat_history_handler(session_id, auth, db, chat).await
}

#[post("/chat/end/<session_id>")]
pub async fn end_chat(
    session_id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> ApiResult<SessionData> {
    handlers::end_session_handler(session_id, auth, db, chat).await
}

#[post("/chat/evaluate/<session_id>")]
pub async fn evaluate_chat(
    session_id: i64,
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> ApiResult<EvaluationData> {
    handlers::evaluate_session_handler(session_id, auth, db, chat).await
}

// Real-time channel

#[get("/ws")]
pub fn websocket(
    ws: rocket_ws::WebSocket,
    db: &State<Database>,
    auth_config: &State<AuthConfig>,
    chat: &State<ChatServices>,
) -> rocket_ws::Channel<'static> {
    realtime::open_channel(
        ws,
        db.inner().clone(),
        auth_config.inner().clone(),
        chat.inner().clone(),
    )
}

// System

#[get("/health")]
pub async fn health(db: &State<Database>) -> ApiResult<HealthData> {
    handlers::health_handler(db).await
}

#[get("/info")]
pub fn service_info() -> ApiResult<InfoData> {
    handlers::info_handler()
}

#[options("/<_..>")]
pub async fn options() -> Status {
    Status::Ok
}

// Error catchers

fn error_body(error: &str, code: &str, suggestions: &[&str]) -> Json<StandardErrorResponse> {
    Json(StandardErrorResponse::new(
        error.to_string(),
        code.to_string(),
        suggestions.iter().map(|s| s.to_string()).collect(),
    ))
}

#[rocket::catch(400)]
pub fn bad_request() -> Json<StandardErrorResponse> {
    error_body(
        "Invalid request format",
        "BAD_REQUEST",
        &[
            "Check your request JSON format",
            "Verify all required fields are present",
        ],
    )
}

#[rocket::catch(401)]
pub fn unauthorized(req: &Request) -> Json<StandardErrorResponse> {
    match req.local_cache(|| AuthFailure(None)).0 {
        Some(failure) => error_body(failure.message(), failure.code(), &["Log in again"]),
        None => error_body("Authorization required", "UNAUTHORIZED", &["Log in again"]),
    }
}

#[rocket::catch(404)]
pub fn not_found() -> Json<StandardErrorResponse> {
    error_body("Resource not found", "NOT_FOUND", &[])
}

#[rocket::catch(413)]
pub fn payload_too_large() -> Json<StandardErrorResponse> {
    error_body(
        "Request is too large",
        "PAYLOAD_TOO_LARGE",
        &["Upload at most 4 files of 1 MB each"],
    )
}

#[rocket::catch(422)]
pub fn unprocessable() -> Json<StandardErrorResponse> {
    error_body(
        "Request body could not be processed",
        "UNPROCESSABLE_ENTITY",
        &["Verify field names and types"],
    )
}

#[rocket::catch(500)]
pub fn internal_error() -> Json<StandardErrorResponse> {
    error_body(
        "Internal server error",
        "INTERNAL_ERROR",
        &[
            "Try again in a few moments",
            "Contact support if the problem persists",
        ],
    )
}

/// Assemble the application around an open database and a completion client
pub fn build_rocket(
    config: &ConfigManager,
    db: Database,
    llm: Arc<dyn ChatCompletion>,
) -> Rocket<Build> {
    let limits = Limits::default()
        .limit("json", 2.mebibytes())
        .limit("file", 10.mebibytes())
        .limit("data-form", 48.mebibytes());

    let figment = rocket::Config::figment()
        .merge(("address", config.server.address.clone()))
        .merge(("port", config.server.port))
        .merge(("limits", limits));

    let chat = ChatServices::new(
        db.clone(),
        Interviewer::new(llm),
        Duration::from_millis(config.chat.chunk_delay_ms),
    );

    rocket::custom(figment)
        .attach(Cors)
        .manage(ServerConfig {
            uploads: config.uploads.clone(),
        })
        .manage(AuthConfig::new(&config.auth))
        .manage(db)
        .manage(chat)
        .register(
            "/api",
            catchers![
                bad_request,
                unauthorized,
                not_found,
                payload_too_large,
                unprocessable,
                internal_error
            ],
        )
        .mount(
            "/api",
            routes![
                register,
                login,
                me,
                setup_interview,
                setup_personalized_interview,
                list_sessions,
                get_session,
                interview_history,
                interview_history_entry,
                get_assessment,
                generate_assessment,
                stream_message,
                chat_history,
                end_chat,
                evaluate_chat,
                websocket,
                health,
                service_info,
                options,
            ],
        )
}

// Main server start function
pub async fn start_web_server(config: ConfigManager) -> Result<()> {
    let db = match Database::new(&config.server.database_path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to initialize database: {:#}", e);
            return Err(e);
        }
    };

    let llm: Arc<dyn ChatCompletion> = Arc::new(AzureOpenAiClient::new(&config.azure)?);

    info!("Starting TrueMirror API server");
    info!("Environment: {}", config.environment);
    info!("Database: {}", db.database_path().display());
    info!(
        "Listening on http://{}:{}",
        config.server.address, config.server.port
    );

    build_rocket(&config, db, llm)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("Server stopped with an error: {}", e))?;

    Ok(())
}
