// src/web/handlers/personalized_handlers.rs
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

use crate::auth::AuthenticatedUser;
use crate::core::document_processor::{DocumentProcessor, UploadedFile};
use crate::core::Database;
use crate::database::SessionRepository;
use crate::interview_ai::ChatServices;
use crate::types::{InterviewMode, InterviewStyle, Language, NewInterviewSession};
use crate::utils::non_empty;
use crate::web::types::{
    ApiError, DataResponse, PersonalizedSetupForm, ServerConfig, SessionData,
};

pub async fn personalized_setup_handler(
    form: Form<PersonalizedSetupForm<'_>>,
    auth: AuthenticatedUser,
    config: &State<ServerConfig>,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> Result<(Status, Json<DataResponse<SessionData>>), ApiError> {
    let form = form.into_inner();

    let style = non_empty(form.style.as_deref())
        .ok_or_else(|| ApiError::bad_request("Please choose an interview style", "MISSING_FIELDS"))?
        .parse::<InterviewStyle>()
        .map_err(|_| ApiError::bad_request("Invalid interview style", "INVALID_STYLE"))?;
    let language = non_empty(form.language.as_deref())
        .ok_or_else(|| ApiError::bad_request("Please choose a language", "MISSING_FIELDS"))?
        .parse::<Language>()
        .map_err(|_| ApiError::bad_request("Invalid language", "INVALID_LANGUAGE"))?;

    info!(
        "User {} uploading {} files for a personalized interview",
        auth.email(),
        form.files.len()
    );

    let mut uploads = Vec::with_capacity(form.files.len());
    for file in &form.files {
        uploads.push(read_upload(file).await?);
    }

    let documents = DocumentProcessor::new(&config.uploads)
        .process_all(uploads)
        .map_err(|e| {
            warn!("Rejected upload from {}: {}", auth.email(), e);
            ApiError::bad_request(e.to_string(), "INVALID_FILE")
                .with_suggestions(&["Upload PDF, DOCX, TXT, JPG or PNG files up to 1 MB"])
        })?;

    let interviewer = &chat.interviewer;
    let mut texts = Vec::with_capacity(documents.len());
    for document in &documents {
        let text = match &document.text {
            Some(text) => text.clone(),
            None => interviewer.extract_text(document).await.map_err(|e| {
                warn!("Could not read {}: {:#}", document.filename, e);
                ApiError::bad_request(
                    format!("Could not read the content of {}", document.filename),
                    "EXTRACTION_FAILED",
                )
            })?,
        };
        texts.push(format!("File: {}\n{}", document.filename, text));
    }

    let profile = interviewer
        .analyze_profile(&texts, language)
        .await
        .map_err(|e| ApiError::internal("Failed to analyze the uploaded documents", e))?;

    let questions = interviewer
        .generate_questions(&profile, style, language)
        .await
        .map_err(|e| ApiError::internal("Failed to generate interview questions", e))?;

    let (profile_json, questions_json) =
        match (serde_json::to_string(&profile), serde_json::to_string(&questions)) {
            (Ok(profile), Ok(questions)) => (profile, questions),
            (Err(e), _) | (_, Err(e)) => {
                return Err(ApiError::internal(
                    "Failed to store the candidate profile",
                    e.into(),
                ))
            }
        };

    let session = SessionRepository::new(db.pool())
        .create(&NewInterviewSession {
            user_id: auth.id(),
            mode: InterviewMode::Personalized,
            position: Some(profile.position_or_na()),
            industry: Some(profile.industry_or_na()),
            style,
            language,
            uploaded_files_info: Some(profile_json),
            custom_questions: Some(questions_json),
        })
        .await
        .map_err(|e| ApiError::internal("Failed to create interview session", e))?;

    info!(
        "Personalized session {} created for {} with {} questions",
        session.id,
        auth.email(),
        questions.len()
    );

    Ok((
        Status::Created,
        Json(DataResponse::success(
            "Personalized interview session created",
            SessionData { session },
        )),
    ))
}

/// Read a multipart file fully into memory along with its metadata
async fn read_upload(file: &TempFile<'_>) -> Result<UploadedFile, ApiError> {
    let filename = file
        .raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .unwrap_or_default();
    let content_type = file.content_type().map(|ct| ct.to_string());

    let mut bytes = Vec::new();
    let read = async {
        let reader = file.open().await?;
        tokio::pin!(reader);
        reader.read_to_end(&mut bytes).await
    };
    if let Err(e) = read.await {
        error!("Failed to read uploaded file {}: {}", filename, e);
        return Err(ApiError::bad_request(
            format!("Failed to read uploaded file {}", filename),
            "UPLOAD_ERROR",
        )
        .with_suggestions(&["Try uploading the file again"]));
    }

    Ok(UploadedFile {
        filename,
        content_type,
        bytes,
    })
}
