use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use tracing::{error, info, warn};

use nexsy_types::api::{
    Claims, LoginRequest, LoginResponse, LoginUser, RegisterRequest, RegisterResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, blocking};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),
    #[error("invalid or expired token")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Password hashing and bearer tokens. Tokens are HS256 with the username as
/// `sub`.
#[derive(Clone)]
pub struct Credentials {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Credentials {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    /// Argon2id with a fresh salt.
    pub fn hash_password(password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// False for a wrong password and for a stored hash that does not parse.
    pub fn verify_password(password: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            warn!("Stored password hash is not a valid PHC string");
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    pub fn issue(&self, username: &str) -> Result<String, AuthError> {
        let claims = Claims {
            sub: username.to_string(),
            exp: (Utc::now() + self.ttl).timestamp().max(0) as usize,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(AuthError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    const FAILED: &str = "Server error during registration";

    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Username and password required"));
    }
    if req.username.chars().count() < MIN_USERNAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Username must be at least {} characters",
            MIN_USERNAME_LEN
        )));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let db = state.db.clone();
    let name = req.username.clone();
    let taken = blocking(move || db.user_exists(&name)).await.map_err(|e| {
        error!("Registration lookup for {} failed: {:#}", req.username, e);
        ApiError::internal(FAILED)
    })?;
    if taken {
        return Err(ApiError::bad_request("Username already taken"));
    }

    let password_hash = Credentials::hash_password(&req.password).map_err(|e| {
        error!("Registration of {} failed: {}", req.username, e);
        ApiError::internal(FAILED)
    })?;

    let db = state.db.clone();
    let RegisterRequest {
        username, email, ..
    } = req;
    let name = username.clone();
    let created =
        blocking(move || db.create_user(&name, email.as_deref(), &password_hash, Utc::now()))
            .await
            .map_err(|e| {
                error!("Failed to create user {}: {:#}", username, e);
                ApiError::internal(FAILED)
            })?;
    // Taken between the lookup and the insert by a concurrent registration.
    if !created {
        return Err(ApiError::bad_request("Username already taken"));
    }

    info!("Registered user {}", username);
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "Registration successful! You can now login.".into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    const FAILED: &str = "Server error during login";
    const REJECTED: &str = "Invalid username or password";

    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Username and password required"));
    }

    let db = state.db.clone();
    let name = req.username.clone();
    let user = blocking(move || db.get_user_by_username(&name))
        .await
        .map_err(|e| {
            error!("Login lookup for {} failed: {:#}", req.username, e);
            ApiError::internal(FAILED)
        })?
        .ok_or_else(|| ApiError::bad_request(REJECTED))?;

    if !Credentials::verify_password(&req.password, &user.password) {
        warn!("Failed login for {}", user.username);
        return Err(ApiError::bad_request(REJECTED));
    }

    let db = state.db.clone();
    let name = user.username.clone();
    blocking(move || db.set_presence(&name, true, Utc::now()))
        .await
        .map_err(|e| {
            error!("Failed to stamp {} online at login: {:#}", user.username, e);
            ApiError::internal(FAILED)
        })?;

    let token = state.credentials.issue(&user.username).map_err(|e| {
        error!("Login of {} failed: {}", user.username, e);
        ApiError::internal(FAILED)
    })?;

    info!("{} logged in", user.username);
    Ok(Json(LoginResponse {
        success: true,
        token,
        user: LoginUser {
            username: user.username,
        },
    }))
}
