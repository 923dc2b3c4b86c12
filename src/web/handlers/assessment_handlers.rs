// src/web/handlers/assessment_handlers.rs
use rocket::serde::json::Json;
use rocket::State;
use tracing::info;

use crate::auth::AuthenticatedUser;
use crate::core::Database;
use crate::database::{AssessmentRepository, SessionRepository};
use crate::interview_ai::ChatServices;
use crate::web::types::{ApiError, ApiResult, AssessmentData, DataResponse, GeneratedAssessmentData};

pub async fn get_assessment_handler(
    auth: AuthenticatedUser,
    db: &State<Database>,
) -> ApiResult<AssessmentData> {
    let assessment = AssessmentRepository::new(db.pool())
        .find_by_user(auth.id())
        .await
        .map_err(|e| ApiError::internal("Failed to load assessment", e))?;

    let message = if assessment.is_some() {
        "Assessment found"
    } else {
        "No assessment generated yet"
    };
    Ok(Json(DataResponse::success(
        message,
        AssessmentData { assessment },
    )))
}

pub async fn generate_assessment_handler(
    auth: AuthenticatedUser,
    db: &State<Database>,
    chat: &State<ChatServices>,
) -> ApiResult<GeneratedAssessmentData> {
    let sessions = SessionRepository::new(db.pool())
        .list_evaluated_for_user(auth.id())
        .await
        .map_err(|e| ApiError::internal("Failed to load evaluations", e))?;

    let evaluations: Vec<_> = sessions
        .into_iter()
        .filter_map(|session| {
            let evaluation = session.evaluation.clone()?;
            Some((session, evaluation))
        })
        .collect();

    if evaluations.is_empty() {
        return Ok(Json(DataResponse::success(
            "No evaluated interviews yet. Complete and evaluate an interview first.",
            GeneratedAssessmentData {
                assessment: None,
                total_sessions: 0,
            },
        )));
    }

    let content = chat
        .interviewer
        .overall_assessment(&evaluations)
        .await
        .map_err(|e| ApiError::internal("Failed to generate assessment", e))?;

    let assessment = AssessmentRepository::new(db.pool())
        .upsert(auth.id(), &content)
        .await
        .map_err(|e| ApiError::internal("Failed to store assessment", e))?;

    info!(
        "Generated assessment for {} from {} sessions",
        auth.email(),
        evaluations.len()
    );

    Ok(Json(DataResponse::success(
        "Assessment generated",
        GeneratedAssessmentData {
            assessment: Some(assessment),
            total_sessions: evaluations.len(),
        },
    )))
}
