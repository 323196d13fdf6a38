//! Persistence boundary the pipeline consumes. `PgChatStore` is the real
//! implementation; tests use an in-memory store.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::framework::TaxonomyCandidate;
use crate::models::message::{MessageRole, MessageRow};
use crate::models::session::ChatSessionRow;
use crate::models::skill::{MappedSkillRow, SkillSystem};

/// A taxonomy entry ready to be persisted as a mapped skill.
#[derive(Debug, Clone)]
pub struct SkillRecord {
    pub system: SkillSystem,
    pub uri: String,
    pub title: String,
    pub reference_language: String,
    pub preferred_label: Value,
    pub description: Value,
    pub links: Value,
}

impl SkillRecord {
    pub fn from_candidate(system: SkillSystem, candidate: &TaxonomyCandidate) -> Result<Self> {
        Ok(SkillRecord {
            system,
            uri: candidate.uri.clone(),
            title: candidate.title.clone(),
            reference_language: candidate.reference_language.clone(),
            preferred_label: serde_json::to_value(&candidate.preferred_label)?,
            description: serde_json::to_value(&candidate.description)?,
            links: candidate.links.clone(),
        })
    }
}

/// Save/query operations over users' chat data, scoped to what the
/// pipeline and chat handler need.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_session(&self, user_id: Uuid, name: Option<&str>) -> Result<ChatSessionRow>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<ChatSessionRow>>;

    /// Appends a message and bumps the session's `updated_at`.
    async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
        token_usage: i32,
        model_name: Option<&str>,
    ) -> Result<MessageRow>;

    /// All messages of a session in ascending timestamp order.
    async fn session_messages(&self, session_id: Uuid) -> Result<Vec<MessageRow>>;

    async fn save_mapped_skill(
        &self,
        session_id: Uuid,
        origin_message_id: Uuid,
        record: &SkillRecord,
    ) -> Result<MappedSkillRow>;
}

pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn create_session(&self, user_id: Uuid, name: Option<&str>) -> Result<ChatSessionRow> {
        let session: ChatSessionRow = sqlx::query_as(
            "INSERT INTO chat_sessions (user_id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<ChatSessionRow>> {
        let session: Option<ChatSessionRow> =
            sqlx::query_as("SELECT * FROM chat_sessions WHERE id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
        token_usage: i32,
        model_name: Option<&str>,
    ) -> Result<MessageRow> {
        let message: MessageRow = sqlx::query_as(
            r#"
            INSERT INTO chat_messages (session_id, role, content, token_usage, model_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(token_usage)
        .bind(model_name)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query("UPDATE chat_sessions SET updated_at = now() WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(message)
    }

    async fn session_messages(&self, session_id: Uuid) -> Result<Vec<MessageRow>> {
        let messages: Vec<MessageRow> = sqlx::query_as(
            "SELECT * FROM chat_messages WHERE session_id = $1 ORDER BY timestamp ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    async fn save_mapped_skill(
        &self,
        session_id: Uuid,
        origin_message_id: Uuid,
        record: &SkillRecord,
    ) -> Result<MappedSkillRow> {
        let skill: MappedSkillRow = sqlx::query_as(
            r#"
            INSERT INTO mapped_skills
                (session_id, origin_message_id, skill_system, uri, title,
                 reference_language, preferred_label, description, extra_links)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(origin_message_id)
        .bind(record.system.as_tag())
        .bind(&record.uri)
        .bind(&record.title)
        .bind(&record.reference_language)
        .bind(&record.preferred_label)
        .bind(&record.description)
        .bind(&record.links)
        .fetch_one(&self.pool)
        .await?;
        Ok(skill)
    }
}
