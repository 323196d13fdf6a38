pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::chat;
use crate::sessions;
use crate::state::AppState;
use crate::users;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Users
        .route("/api/v1/users/register", post(users::handlers::handle_register))
        .route("/api/v1/users/login", post(users::handlers::handle_login))
        .route("/api/v1/users", get(users::handlers::handle_list_users))
        .route("/api/v1/users/:user_id", get(users::handlers::handle_get_user))
        // Chat
        .route("/api/v1/users/:user_id/chat", post(chat::handlers::handle_chat))
        // Sessions
        .route(
            "/api/v1/users/:user_id/sessions",
            post(sessions::handlers::handle_create_session)
                .get(sessions::handlers::handle_list_sessions),
        )
        .route(
            "/api/v1/sessions/:session_id",
            get(sessions::handlers::handle_get_session)
                .put(sessions::handlers::handle_rename_session)
                .delete(sessions::handlers::handle_delete_session),
        )
        .route(
            "/api/v1/sessions/:session_id/messages",
            get(sessions::handlers::handle_session_messages),
        )
        .route(
            "/api/v1/sessions/:session_id/skills",
            get(sessions::handlers::handle_session_skills),
        )
        .route(
            "/api/v1/sessions/:session_id/skills/:skill_system",
            get(sessions::handlers::handle_session_skills_by_system),
        )
        // Skills
        .route(
            "/api/v1/skills/systems",
            get(sessions::handlers::handle_skill_systems),
        )
        .with_state(state)
}
