//! User registration, login, and public reads.
//!
//! Login is by username only — this is a demo identity layer; the token
//! it issues is what the protected routes check.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::create_access_token;
use crate::errors::AppError;
use crate::models::user::User;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: User,
}

/// POST /api/v1/users/register
pub async fn handle_register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<User>, AppError> {
    let username = request.username.trim();
    let email = request.email.trim();
    if username.is_empty() || email.is_empty() {
        return Err(AppError::Validation(
            "username and email are required".to_string(),
        ));
    }

    let existing: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE username = $1 OR email = $2")
            .bind(username)
            .bind(email)
            .fetch_optional(&state.db)
            .await?;

    if let Some(existing) = existing {
        let detail = if existing.username == username {
            "Username already exists"
        } else {
            "Email already exists"
        };
        return Err(AppError::Validation(detail.to_string()));
    }

    let user: User =
        sqlx::query_as("INSERT INTO users (username, email) VALUES ($1, $2) RETURNING *")
            .bind(username)
            .bind(email)
            .fetch_one(&state.db)
            .await?;

    tracing::info!("Registered user {} ({})", user.username, user.id);
    Ok(Json(user))
}

/// POST /api/v1/users/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = $1")
        .bind(request.username.trim())
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let access_token = create_access_token(user.id, &state.config.jwt_secret)
        .map_err(AppError::Internal)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        user,
    }))
}

/// GET /api/v1/users
pub async fn handle_list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, AppError> {
    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(users))
}

/// GET /api/v1/users/:user_id
pub async fn handle_get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?;

    user.map(Json)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}
