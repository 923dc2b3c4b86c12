// src/web/handlers/auth_handlers.rs
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use tracing::{info, warn};

use crate::auth::{verify_password, AuthConfig, AuthenticatedUser};
use crate::core::Database;
use crate::database::{is_unique_violation, UserRepository};
use crate::utils::{is_valid_email, non_empty, normalize_email};
use crate::web::types::{
    ApiError, ApiResult, AuthData, DataResponse, LoginRequest, RegisterRequest, UserData,
};

const MIN_PASSWORD_LENGTH: usize = 6;

fn email_exists() -> ApiError {
    ApiError::conflict("Email is already registered", "EMAIL_EXISTS")
        .with_suggestions(&["Log in instead"])
}

pub async fn register_handler(
    request: Json<RegisterRequest>,
    auth_config: &State<AuthConfig>,
    db: &State<Database>,
) -> Result<(Status, Json<DataResponse<AuthData>>), ApiError> {
    let email = non_empty(request.email.as_deref()).map(|e| normalize_email(&e));
    let full_name = non_empty(request.full_name.as_deref());
    let password = request.password.as_deref().filter(|p| !p.is_empty());

    let (Some(email), Some(password), Some(full_name)) = (email, password, full_name) else {
        warn!("Registration rejected: missing fields");
        return Err(ApiError::bad_request(
            "Please fill in email, password and full name",
            "MISSING_FIELDS",
        ));
    };

    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email address", "INVALID_EMAIL"));
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(
            format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
            "WEAK_PASSWORD",
        ));
    }

    let users = UserRepository::new(db.pool());
    match users.find_by_email(&email).await {
        Ok(Some(_)) => {
            warn!("Registration rejected: {} already exists", email);
            return Err(email_exists());
        }
        Ok(None) => {}
        Err(e) => return Err(ApiError::internal("Failed to check existing account", e)),
    }

    let password_hash = auth_config
        .hash_password(password)
        .map_err(|e| ApiError::internal("Failed to create account", e))?;

    // A concurrent registration can win between the lookup and the insert
    let user = match users.create(&email, &password_hash, &full_name).await {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            warn!("Registration rejected: {} was registered concurrently", email);
            return Err(email_exists());
        }
        Err(e) => return Err(ApiError::internal("Failed to create account", e)),
    };

    let access_token = auth_config
        .issue_token(user.id)
        .map_err(|e| ApiError::internal("Failed to issue access token", e))?;

    info!("Registered user {}", user.email);

    Ok((
        Status::Created,
        Json(DataResponse::success(
            "Registration successful",
            AuthData { user, access_token },
        )),
    ))
}

pub async fn login_handler(
    request: Json<LoginRequest>,
    auth_config: &State<AuthConfig>,
    db: &State<Database>,
) -> ApiResult<AuthData> {
    let email = non_empty(request.email.as_deref()).map(|e| normalize_email(&e));
    let password = request.password.as_deref().filter(|p| !p.is_empty());

    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::bad_request(
            "Please enter email and password",
            "MISSING_FIELDS",
        ));
    };

    let user = UserRepository::new(db.pool())
        .find_by_email(&email)
        .await
        .map_err(|e| ApiError::internal("Failed to load account", e))?;

    let user = match user {
        Some(user) if verify_password(password, &user.password_hash) => user,
        _ => {
            warn!("Failed login for {}", email);
            return Err(ApiError::unauthorized("Invalid email or password"));
        }
    };

    if !user.is_active {
        warn!("Login attempt on deactivated account {}", email);
        return Err(ApiError::forbidden("Account is deactivated")
            .with_suggestions(&["Contact an administrator"]));
    }

    let access_token = auth_config
        .issue_token(user.id)
        .map_err(|e| ApiError::internal("Failed to issue access token", e))?;

    info!("User {} logged in", user.email);

    Ok(Json(DataResponse::success(
        "Login successful",
        AuthData { user, access_token },
    )))
}

pub async fn me_handler(auth: AuthenticatedUser) -> ApiResult<UserData> {
    Ok(Json(DataResponse::success(
        "Current user",
        UserData { user: auth.user },
    )))
}
