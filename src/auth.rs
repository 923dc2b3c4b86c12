// src/auth.rs
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::{Request, State};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::core::config_manager::AuthSettings;
use crate::core::Database;
use crate::database::UserRepository;
use crate::types::User;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User id
    pub iat: usize,
    pub exp: usize,
}

#[derive(Clone)]
pub struct AuthConfig {
    secret: String,
    token_ttl: Duration,
    bcrypt_cost: u32,
}

impl AuthConfig {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            secret: settings.jwt_secret.clone(),
            token_ttl: Duration::hours(settings.token_ttl_hours),
            bcrypt_cost: settings.bcrypt_cost,
        }
    }

    /// Sign an HS256 access token for a user
    pub fn issue_token(&self, user_id: i64) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + self.token_ttl).timestamp() as usize,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to sign access token")
    }

    /// Verify signature and expiry, returning the user id
    pub fn verify_token(&self, token: &str) -> Result<i64> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;

        token_data
            .claims
            .sub
            .parse::<i64>()
            .context("Token subject is not a user id")
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        bcrypt::hash(password, self.bcrypt_cost).context("Failed to hash password")
    }
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Active user resolved from the bearer token
pub struct AuthenticatedUser {
    pub user: User,
}

impl AuthenticatedUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn email(&self) -> &str {
        &self.user.email
    }
}

/// Why the guard rejected the request, read back by the 401 catcher
pub struct AuthFailure(pub Option<AuthError>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = AuthError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let reject = |status: Status, err: AuthError| {
            req.local_cache(|| AuthFailure(Some(err)));
            Outcome::Error((status, err))
        };

        let auth_config = match req.guard::<&State<AuthConfig>>().await {
            Outcome::Success(config) => config,
            Outcome::Error((status, _)) => return reject(status, AuthError::DatabaseError),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        let db = match req.guard::<&State<Database>>().await {
            Outcome::Success(db) => db,
            Outcome::Error((status, _)) => return reject(status, AuthError::DatabaseError),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        // Extract Authorization header
        let token = match req.headers().get_one("Authorization") {
            Some(header) if header.starts_with("Bearer ") => header[7..].trim(),
            Some(_) => {
                warn!("Invalid Authorization header format");
                return reject(Status::Unauthorized, AuthError::InvalidToken);
            }
            None => {
                warn!("Missing Authorization header");
                return reject(Status::Unauthorized, AuthError::MissingToken);
            }
        };

        let user_id = match auth_config.verify_token(token) {
            Ok(id) => id,
            Err(e) => {
                warn!("Token verification failed: {}", e);
                return reject(Status::Unauthorized, AuthError::TokenVerificationFailed);
            }
        };

        match UserRepository::new(db.pool()).find_by_id(user_id).await {
            Ok(Some(user)) if user.is_active => Outcome::Success(AuthenticatedUser { user }),
            Ok(Some(_)) => {
                warn!("Rejected token of deactivated user {}", user_id);
                reject(Status::Unauthorized, AuthError::AccountDisabled)
            }
            Ok(None) => {
                warn!("Token refers to unknown user {}", user_id);
                reject(Status::Unauthorized, AuthError::UserNotFound)
            }
            Err(e) => {
                error!("Failed to load user {}: {}", user_id, e);
                reject(Status::InternalServerError, AuthError::DatabaseError)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    TokenVerificationFailed,
    UserNotFound,
    AccountDisabled,
    DatabaseError,
}

impl AuthError {
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "Authorization token required",
            AuthError::InvalidToken => "Invalid authorization token format",
            AuthError::TokenVerificationFailed => "Invalid or expired token",
            AuthError::UserNotFound => "User not found",
            AuthError::AccountDisabled => "Account is deactivated",
            AuthError::DatabaseError => "Database error occurred",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "AUTH_TOKEN_MISSING",
            AuthError::InvalidToken => "AUTH_TOKEN_MALFORMED",
            AuthError::TokenVerificationFailed => "AUTH_TOKEN_INVALID",
            AuthError::UserNotFound => "AUTH_USER_NOT_FOUND",
            AuthError::AccountDisabled => "AUTH_ACCOUNT_DISABLED",
            AuthError::DatabaseError => "DATABASE_ERROR",
        }
    }
}
