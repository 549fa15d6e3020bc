use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use compass_core::auth as core_auth;
use compass_core::error::ApiError;

use crate::error::AppError;
use crate::state::AppState;

const ACCESS_TOKEN_TTL_SECONDS: i64 = 3600;
const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

pub fn register_router() -> Router<AppState> {
    Router::new().route("/v1/auth/register", post(register))
}

pub fn token_router() -> Router<AppState> {
    Router::new().route("/v1/auth/token", post(token))
}

// ──────────────────────────────────────────────
// POST /v1/auth/register
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub email: String,
    /// Shown exactly once; only its hash is stored.
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Register a new user
///
/// Returns an API key exactly once. Store it securely; it cannot be
/// retrieved again.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "Email already registered", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.email.is_empty() || !req.email.contains('@') {
        return Err(AppError::Validation {
            message: "email must be a valid address".to_string(),
            field: Some("email".to_string()),
            received: Some(serde_json::Value::String(req.email.clone())),
            docs_hint: None,
        });
    }
    if req.password.len() < 8 {
        return Err(AppError::Validation {
            message: "password must be at least 8 characters".to_string(),
            field: Some("password".to_string()),
            received: None,
            docs_hint: None,
        });
    }

    let password_hash = core_auth::hash_password(&req.password).map_err(AppError::Internal)?;
    let user_id = Uuid::now_v7();
    let (api_key, key_hash) = core_auth::generate_api_key();
    let key_prefix = core_auth::key_prefix(&api_key);

    let mut tx = state.db.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, display_name, is_active, created_at) \
         VALUES ($1, $2, $3, $4, TRUE, NOW())",
    )
    .bind(user_id)
    .bind(&req.email)
    .bind(&password_hash)
    .bind(&req.display_name)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.code().as_deref() == Some("23505") {
                return AppError::Validation {
                    message: "email is already registered".to_string(),
                    field: Some("email".to_string()),
                    received: Some(serde_json::Value::String(req.email.clone())),
                    docs_hint: Some("Sign in instead via POST /v1/auth/token.".to_string()),
                };
            }
        }
        AppError::Database(e)
    })?;

    sqlx::query(
        "INSERT INTO api_keys (id, user_id, key_hash, key_prefix, is_revoked, created_at) \
         VALUES ($1, $2, $3, $4, FALSE, NOW())",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(&key_hash)
    .bind(&key_prefix)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            email: req.email,
            api_key,
            display_name: req.display_name,
        }),
    ))
}

// ──────────────────────────────────────────────
// POST /v1/auth/token
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
pub enum TokenRequest {
    /// Exchange email + password for tokens
    Password { email: String, password: String },
    /// Exchange a refresh token for a new token pair
    RefreshToken { refresh_token: String },
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Issue access and refresh tokens
#[utoipa::path(
    post,
    path = "/v1/auth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    match req {
        TokenRequest::Password { email, password } => {
            password_grant(&state.db, &email, &password).await
        }
        TokenRequest::RefreshToken { refresh_token } => {
            refresh_grant(&state.db, &refresh_token).await
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    password_hash: String,
}

async fn password_grant(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
) -> Result<Json<TokenResponse>, AppError> {
    let invalid = || AppError::Unauthorized {
        message: "Invalid email or password".to_string(),
        docs_hint: None,
    };

    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, password_hash FROM users WHERE email = $1 AND is_active = TRUE",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .ok_or_else(invalid)?;

    let valid = core_auth::verify_password(password, &row.password_hash)
        .map_err(AppError::Internal)?;
    if !valid {
        return Err(invalid());
    }

    issue_tokens(pool, row.id).await
}

#[derive(sqlx::FromRow)]
struct RefreshRow {
    id: Uuid,
    user_id: Uuid,
    expires_at: chrono::DateTime<Utc>,
}

async fn refresh_grant(
    pool: &sqlx::PgPool,
    refresh_token: &str,
) -> Result<Json<TokenResponse>, AppError> {
    let token_hash = core_auth::hash_token(refresh_token);
    let row = sqlx::query_as::<_, RefreshRow>(
        "SELECT id, user_id, expires_at FROM refresh_tokens \
         WHERE token_hash = $1 AND is_revoked = FALSE",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Unauthorized {
        message: "Invalid refresh token".to_string(),
        docs_hint: Some("Sign in again via the password grant.".to_string()),
    })?;

    if Utc::now() > row.expires_at {
        return Err(AppError::Unauthorized {
            message: "Refresh token has expired".to_string(),
            docs_hint: Some("Sign in again via the password grant.".to_string()),
        });
    }

    // Rotate: the used refresh token is revoked before a new pair is issued.
    sqlx::query("UPDATE refresh_tokens SET is_revoked = TRUE WHERE id = $1")
        .bind(row.id)
        .execute(pool)
        .await?;

    issue_tokens(pool, row.user_id).await
}

async fn issue_tokens(pool: &sqlx::PgPool, user_id: Uuid) -> Result<Json<TokenResponse>, AppError> {
    let (access_token, access_hash) = core_auth::generate_access_token();
    let (refresh_token, refresh_hash) = core_auth::generate_refresh_token();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO access_tokens (id, user_id, token_hash, expires_at, is_revoked, created_at) \
         VALUES ($1, $2, $3, $4, FALSE, NOW())",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(&access_hash)
    .bind(Utc::now() + Duration::seconds(ACCESS_TOKEN_TTL_SECONDS))
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, is_revoked, created_at) \
         VALUES ($1, $2, $3, $4, FALSE, NOW())",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(&refresh_hash)
    .bind(Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_TTL_SECONDS,
    }))
}
