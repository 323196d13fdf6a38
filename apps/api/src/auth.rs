//! JWT authentication: HS256 access tokens and the `AuthUser` extractor
//! route handlers use to require a logged-in user.

use anyhow::Result;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::User;
use crate::state::AppState;

const ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 30;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
}

/// Issues a signed access token for a user.
pub fn create_access_token(user_id: Uuid, secret: &str) -> Result<String> {
    let expire = Utc::now() + Duration::minutes(ACCESS_TOKEN_EXPIRE_MINUTES);
    let claims = Claims {
        sub: user_id,
        exp: expire.timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Verifies a token's signature and expiry and returns its claims.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// The authenticated user, extracted from the `Authorization: Bearer`
/// header. Rejects with 401 on a missing/invalid token or an unknown user.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        let claims =
            decode_token(token, &state.config.jwt_secret).map_err(|_| AppError::Unauthorized)?;

        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(claims.sub)
            .fetch_optional(&state.db)
            .await?;

        user.map(AuthUser).ok_or(AppError::Unauthorized)
    }
}
