//! Language-model gateway — the single point of entry for all LLM calls.
//!
//! No other module may call the provider API directly. The pipeline and
//! handlers depend on the `LanguageModelGateway` trait only; the concrete
//! provider is selected at startup from configuration.

pub mod openai;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::framework::TaxonomyCandidate;
use crate::models::message::MessageRole;

pub use openai::OpenAiGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport or provider-side failure (auth errors included).
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider throttled the request (HTTP 429). Not retried; the
    /// caller may resubmit.
    #[error("provider rate limited the request")]
    RateLimited,

    /// The reply was empty or its structured output did not parse.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// One turn of a session transcript, in order.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

/// A free-form chat reply with the provider's usage accounting.
#[derive(Debug, Clone)]
pub struct GatewayReply {
    pub content: String,
    pub token_usage: i32,
    pub model_name: String,
}

/// How the extractor classified a skill phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhraseCategory {
    Technical,
    Soft,
    DomainSpecific,
    Other,
}

// Lenient on input: a category the model invents becomes Other rather
// than failing the whole extraction.
impl<'de> Deserialize<'de> for PhraseCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "technical" => PhraseCategory::Technical,
            "soft" => PhraseCategory::Soft,
            "domain-specific" => PhraseCategory::DomainSpecific,
            _ => PhraseCategory::Other,
        })
    }
}

/// A free-text span extracted from a user message believed to describe a
/// skill or competency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillPhrase {
    pub phrase: String,
    pub category: PhraseCategory,
    pub confidence: f32,
    /// Direct quote or paraphrase of the message supporting the inference.
    pub evidence: String,
}

/// An extracted phrase paired with its nonempty taxonomy candidate list.
#[derive(Debug, Clone)]
pub struct PhraseCandidates {
    pub phrase: SkillPhrase,
    pub candidates: Vec<TaxonomyCandidate>,
}

/// The model's choice of candidate for one phrase. `uri: None` means no
/// candidate fit; the phrase is dropped downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhraseMapping {
    pub phrase: String,
    pub uri: Option<String>,
    pub confidence: f32,
}

/// Abstraction over the hosted LLM provider for the three prompted tasks
/// the pipeline needs. One call per operation — no automatic retries.
#[async_trait]
pub trait LanguageModelGateway: Send + Sync {
    /// Generates the assistant reply for an ordered session transcript.
    async fn generate_reply(&self, history: &[ChatTurn]) -> Result<GatewayReply, GatewayError>;

    /// Extracts skill phrases from a single user message. An empty list is
    /// a valid success (no skills mentioned).
    async fn extract_skill_phrases(
        &self,
        message_text: &str,
    ) -> Result<Vec<SkillPhrase>, GatewayError>;

    /// Chooses the best taxonomy candidate per phrase, or none, in one
    /// batched call.
    async fn map_phrases(
        &self,
        batch: &[PhraseCandidates],
    ) -> Result<Vec<PhraseMapping>, GatewayError>;
}
