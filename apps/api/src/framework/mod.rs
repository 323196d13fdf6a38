//! Competency-framework adapter — read-through search over a remote
//! skills taxonomy. Only ESCO is implemented; the trait keeps the
//! pipeline agnostic to which taxonomy backs it.

pub mod esco;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::skill::SkillSystem;

pub use esco::EscoClient;

#[derive(Debug, Error)]
pub enum FrameworkError {
    /// The taxonomy endpoint was unreachable, timed out, or returned a
    /// non-success status.
    #[error("framework unavailable: {0}")]
    Unavailable(String),

    /// The endpoint answered but the body did not match the wire shape.
    #[error("framework response did not decode: {0}")]
    Decode(String),
}

/// One ranked taxonomy entry returned by a search.
/// `preferred_label` and `description` are language→string maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyCandidate {
    pub uri: String,
    pub title: String,
    pub reference_language: String,
    pub preferred_label: HashMap<String, String>,
    pub description: HashMap<String, String>,
    pub links: Value,
}

/// Abstraction over a remote skills taxonomy search endpoint.
///
/// Callers treat any error as "zero candidates for this phrase" — a
/// framework failure is never pipeline-fatal.
#[async_trait]
pub trait CompetencyFramework: Send + Sync {
    async fn search(
        &self,
        query: &str,
        limit: u32,
        language: &str,
    ) -> Result<Vec<TaxonomyCandidate>, FrameworkError>;

    /// Which taxonomy this adapter serves.
    fn system(&self) -> SkillSystem;
}
