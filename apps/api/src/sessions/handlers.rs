//! Session CRUD and the message/skill listings — thin reads and writes
//! over the persistence layer. All session routes are owner-only.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::message::MessageRow;
use crate::models::session::ChatSessionRow;
use crate::models::skill::{MappedSkillRow, SkillSystem};
use crate::models::user::User;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionUpsertRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionWithSkills {
    #[serde(flatten)]
    pub session: ChatSessionRow,
    pub esco_skills: Vec<MappedSkillRow>,
}

/// Loads a session and rejects unless it belongs to `user`.
async fn load_owned_session(
    state: &AppState,
    session_id: Uuid,
    user: &User,
) -> Result<ChatSessionRow, AppError> {
    let session: Option<ChatSessionRow> =
        sqlx::query_as("SELECT * FROM chat_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&state.db)
            .await?;

    let session =
        session.ok_or_else(|| AppError::NotFound("Chat session not found".to_string()))?;

    if session.user_id != user.id {
        return Err(AppError::Forbidden(
            "Access denied to this chat session".to_string(),
        ));
    }

    Ok(session)
}

/// POST /api/v1/users/:user_id/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    AuthUser(current_user): AuthUser,
    Json(request): Json<SessionUpsertRequest>,
) -> Result<Json<ChatSessionRow>, AppError> {
    if user_id != current_user.id {
        return Err(AppError::Forbidden(
            "Cannot create session for other users".to_string(),
        ));
    }

    let session = state
        .store
        .create_session(current_user.id, request.name.as_deref())
        .await?;
    Ok(Json(session))
}

/// GET /api/v1/users/:user_id/sessions
pub async fn handle_list_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    AuthUser(current_user): AuthUser,
) -> Result<Json<Vec<SessionWithSkills>>, AppError> {
    if user_id != current_user.id {
        return Err(AppError::Forbidden(
            "Access denied to other user's sessions".to_string(),
        ));
    }

    let sessions: Vec<ChatSessionRow> =
        sqlx::query_as("SELECT * FROM chat_sessions WHERE user_id = $1 ORDER BY updated_at DESC")
            .bind(user_id)
            .fetch_all(&state.db)
            .await?;

    let mut out = Vec::with_capacity(sessions.len());
    for session in sessions {
        let esco_skills: Vec<MappedSkillRow> = sqlx::query_as(
            "SELECT * FROM mapped_skills WHERE session_id = $1 AND skill_system = $2 ORDER BY created_at",
        )
        .bind(session.id)
        .bind(SkillSystem::Esco.as_tag())
        .fetch_all(&state.db)
        .await?;
        out.push(SessionWithSkills {
            session,
            esco_skills,
        });
    }

    Ok(Json(out))
}

/// GET /api/v1/sessions/:session_id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    AuthUser(current_user): AuthUser,
) -> Result<Json<ChatSessionRow>, AppError> {
    let session = load_owned_session(&state, session_id, &current_user).await?;
    Ok(Json(session))
}

/// PUT /api/v1/sessions/:session_id
pub async fn handle_rename_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    AuthUser(current_user): AuthUser,
    Json(request): Json<SessionUpsertRequest>,
) -> Result<Json<ChatSessionRow>, AppError> {
    let session = load_owned_session(&state, session_id, &current_user).await?;

    let Some(name) = request.name else {
        return Ok(Json(session));
    };

    let session: ChatSessionRow = sqlx::query_as(
        "UPDATE chat_sessions SET name = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(name)
    .bind(session.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(session))
}

/// DELETE /api/v1/sessions/:session_id
///
/// Cascades to the session's messages and mapped skills.
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    AuthUser(current_user): AuthUser,
) -> Result<StatusCode, AppError> {
    let session = load_owned_session(&state, session_id, &current_user).await?;

    sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
        .bind(session.id)
        .execute(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/sessions/:session_id/messages
pub async fn handle_session_messages(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    AuthUser(current_user): AuthUser,
) -> Result<Json<Vec<MessageRow>>, AppError> {
    let session = load_owned_session(&state, session_id, &current_user).await?;
    let messages = state.store.session_messages(session.id).await?;
    Ok(Json(messages))
}

/// GET /api/v1/sessions/:session_id/skills
///
/// All mapped skills for a session grouped by skill system. Only "ESCO"
/// is populated today; the grouping is the open seam for more.
pub async fn handle_session_skills(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    AuthUser(current_user): AuthUser,
) -> Result<Json<HashMap<String, Vec<MappedSkillRow>>>, AppError> {
    let session = load_owned_session(&state, session_id, &current_user).await?;

    let skills: Vec<MappedSkillRow> =
        sqlx::query_as("SELECT * FROM mapped_skills WHERE session_id = $1 ORDER BY created_at")
            .bind(session.id)
            .fetch_all(&state.db)
            .await?;

    let mut grouped: HashMap<String, Vec<MappedSkillRow>> = HashMap::new();
    for skill in skills {
        grouped.entry(skill.skill_system.clone()).or_default().push(skill);
    }

    Ok(Json(grouped))
}

/// GET /api/v1/sessions/:session_id/skills/:skill_system
///
/// Skills for one system; unknown systems yield an empty list.
pub async fn handle_session_skills_by_system(
    State(state): State<AppState>,
    Path((session_id, skill_system)): Path<(Uuid, String)>,
    AuthUser(current_user): AuthUser,
) -> Result<Json<Vec<MappedSkillRow>>, AppError> {
    let session = load_owned_session(&state, session_id, &current_user).await?;

    let skills: Vec<MappedSkillRow> = sqlx::query_as(
        "SELECT * FROM mapped_skills WHERE session_id = $1 AND skill_system = $2 ORDER BY created_at",
    )
    .bind(session.id)
    .bind(&skill_system)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(skills))
}

/// GET /api/v1/skills/systems
pub async fn handle_skill_systems() -> Json<Vec<&'static str>> {
    Json(SkillSystem::known())
}
