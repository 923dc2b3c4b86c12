// src/web/handlers/system_handlers.rs
use rocket::serde::json::Json;
use rocket::State;

use crate::core::Database;
use crate::web::types::{ApiError, ApiResult, DataResponse, HealthData, InfoData};

pub async fn health_handler(db: &State<Database>) -> ApiResult<HealthData> {
    db.health_check()
        .await
        .map_err(|e| ApiError::internal("Database is unavailable", e))?;

    Ok(Json(DataResponse::success(
        "Service is running",
        HealthData {
            status: "healthy".to_string(),
            message: "TrueMirror API is running".to_string(),
        },
    )))
}

pub fn info_handler() -> ApiResult<InfoData> {
    Ok(Json(DataResponse::success(
        "Service information",
        InfoData {
            app: "TrueMirror".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "AI mock interview backend".to_string(),
        },
    )))
}
