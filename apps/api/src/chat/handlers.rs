use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::chat::pipeline::run_chat_pipeline;
use crate::errors::AppError;
use crate::models::message::MessageRow;
use crate::models::session::ChatSessionRow;
use crate::models::skill::MappedSkillRow;
use crate::state::AppState;

const DEFAULT_SESSION_NAME: &str = "New Chat Session";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub user_message: MessageRow,
    pub assistant_reply: MessageRow,
    pub mapped_skills: Vec<MappedSkillRow>,
    pub skills_processed: bool,
}

/// POST /api/v1/users/:user_id/chat
///
/// Runs one pipeline pass for an incoming message. Reply-stage failures
/// degrade (HTTP 200, `skills_processed: false`); enrichment failures
/// only shrink `mapped_skills`.
pub async fn handle_chat(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    AuthUser(current_user): AuthUser,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if user_id != current_user.id {
        return Err(AppError::Forbidden("Cannot chat as another user".to_string()));
    }

    if request.message.trim().is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }

    let session = resolve_session(&state, &request, current_user.id).await?;

    let outcome = run_chat_pipeline(
        state.store.as_ref(),
        state.llm.as_ref(),
        state.framework.as_ref(),
        &state.config.esco_language,
        &session,
        &request.message,
    )
    .await?;

    Ok(Json(ChatResponse {
        session_id: session.id,
        user_message: outcome.user_message,
        assistant_reply: outcome.assistant_message,
        mapped_skills: outcome.mapped_skills,
        skills_processed: outcome.skills_processed,
    }))
}

/// Loads the requested session (owner-checked) or creates a fresh one.
async fn resolve_session(
    state: &AppState,
    request: &ChatRequest,
    user_id: Uuid,
) -> Result<ChatSessionRow, AppError> {
    match request.session_id {
        Some(session_id) => {
            let session = state
                .store
                .get_session(session_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Chat session not found".to_string()))?;
            if session.user_id != user_id {
                return Err(AppError::Forbidden(
                    "Session does not belong to this user".to_string(),
                ));
            }
            Ok(session)
        }
        None => {
            let session = state
                .store
                .create_session(user_id, Some(DEFAULT_SESSION_NAME))
                .await?;
            Ok(session)
        }
    }
}
