//! The extraction-and-mapping pipeline.
//!
//! Flow per user message: persist it → generate + persist the assistant
//! reply → extract skill phrases → search taxonomy candidates per phrase →
//! map the batch → persist mapped skills linked to the triggering message.
//!
//! The chat reply is the primary deliverable; skill mapping is an
//! enrichment. Failures after the reply stage are logged and surface only
//! as fewer or zero mapped skills, never as a request error. No stage
//! retries automatically — a caller may resubmit.

use tracing::{info, warn};

use crate::chat::store::{ChatStore, SkillRecord};
use crate::errors::AppError;
use crate::framework::CompetencyFramework;
use crate::llm::{ChatTurn, LanguageModelGateway, PhraseCandidates};
use crate::models::message::{MessageRole, MessageRow};
use crate::models::session::ChatSessionRow;
use crate::models::skill::MappedSkillRow;

/// Returned to the user when reply generation fails. No skills are
/// processed in that case.
pub const DEGRADED_REPLY: &str =
    "I'm sorry, I'm having trouble responding right now. Please try sending \
     your message again in a moment.";

/// Candidates requested per phrase from the taxonomy search.
const SEARCH_LIMIT: u32 = 20;

/// Everything one pipeline pass produced.
#[derive(Debug)]
pub struct ChatOutcome {
    pub user_message: MessageRow,
    pub assistant_message: MessageRow,
    pub mapped_skills: Vec<MappedSkillRow>,
    /// False only when the reply stage degraded and extraction was skipped.
    pub skills_processed: bool,
}

pub async fn run_chat_pipeline(
    store: &dyn ChatStore,
    llm: &dyn LanguageModelGateway,
    framework: &dyn CompetencyFramework,
    language: &str,
    session: &ChatSessionRow,
    message_text: &str,
) -> Result<ChatOutcome, AppError> {
    // Received: persist the user message first so it survives whatever
    // happens downstream.
    let user_message = store
        .append_message(session.id, MessageRole::User, message_text, 0, None)
        .await?;

    // Replying: the full ordered transcript, including the new message.
    let history: Vec<ChatTurn> = store
        .session_messages(session.id)
        .await?
        .into_iter()
        .map(|m| ChatTurn {
            role: m.role,
            content: m.content,
        })
        .collect();

    let assistant_message = match llm.generate_reply(&history).await {
        Ok(reply) => {
            store
                .append_message(
                    session.id,
                    MessageRole::Assistant,
                    &reply.content,
                    reply.token_usage,
                    Some(&reply.model_name),
                )
                .await?
        }
        Err(e) => {
            warn!("Reply generation failed for session {}: {e}", session.id);
            let degraded = store
                .append_message(session.id, MessageRole::Assistant, DEGRADED_REPLY, 0, None)
                .await?;
            return Ok(ChatOutcome {
                user_message,
                assistant_message: degraded,
                mapped_skills: Vec::new(),
                skills_processed: false,
            });
        }
    };

    let done = |mapped_skills| ChatOutcome {
        user_message: user_message.clone(),
        assistant_message: assistant_message.clone(),
        mapped_skills,
        skills_processed: true,
    };

    // Extracting: always on the user's message content. An empty list or
    // an unparseable extraction both mean "no skills this time".
    let phrases = match llm.extract_skill_phrases(&user_message.content).await {
        Ok(phrases) => phrases,
        Err(e) => {
            warn!("Skill extraction failed for message {}: {e}", user_message.id);
            Vec::new()
        }
    };

    if phrases.is_empty() {
        info!("No skill phrases in message {}", user_message.id);
        return Ok(done(Vec::new()));
    }

    // Searching: per-phrase, in extraction order. A failed or empty search
    // drops that phrase only; siblings proceed.
    let mut batch: Vec<PhraseCandidates> = Vec::new();
    for phrase in phrases {
        match framework.search(&phrase.phrase, SEARCH_LIMIT, language).await {
            Ok(candidates) if candidates.is_empty() => {
                info!("No taxonomy candidates for phrase {:?}", phrase.phrase);
            }
            Ok(candidates) => batch.push(PhraseCandidates { phrase, candidates }),
            Err(e) => {
                warn!("Taxonomy search failed for phrase {:?}: {e}", phrase.phrase);
            }
        }
    }

    if batch.is_empty() {
        return Ok(done(Vec::new()));
    }

    // Mapping: one batched call. If the output is unusable, drop all
    // mapping for this message — no partial guess.
    let mappings = match llm.map_phrases(&batch).await {
        Ok(mappings) => mappings,
        Err(e) => {
            warn!("Phrase mapping failed for message {}: {e}", user_message.id);
            return Ok(done(Vec::new()));
        }
    };

    // Persisting: phrases the model left unmatched are dropped silently.
    // Two phrases choosing the same URI persist as independent rows —
    // deduplication is a presentation concern.
    let system = framework.system();
    let mut mapped_skills = Vec::new();
    for mapping in mappings {
        let Some(uri) = mapping.uri else {
            continue;
        };

        // Pairing is by phrase text. If extraction returns the same
        // phrase twice, both entries queried the taxonomy with the same
        // text and carry the same candidate set, so resolving against
        // the first match is not ambiguous.
        let candidate = batch
            .iter()
            .find(|pc| pc.phrase.phrase == mapping.phrase)
            .and_then(|pc| pc.candidates.iter().find(|c| c.uri == uri));

        match candidate {
            Some(candidate) => {
                let record = SkillRecord::from_candidate(system.clone(), candidate)?;
                let row = store
                    .save_mapped_skill(session.id, user_message.id, &record)
                    .await?;
                mapped_skills.push(row);
            }
            None => {
                // The model answered with a URI it was never offered for
                // this phrase; persisting it would break the link between
                // skills and their candidate sets.
                warn!(
                    "Mapping chose unknown uri {uri:?} for phrase {:?}; dropping",
                    mapping.phrase
                );
            }
        }
    }

    info!(
        "Message {} produced {} mapped skills",
        user_message.id,
        mapped_skills.len()
    );

    Ok(done(mapped_skills))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{FrameworkError, TaxonomyCandidate};
    use crate::llm::{GatewayError, GatewayReply, PhraseCategory, PhraseMapping, SkillPhrase};
    use crate::models::skill::SkillSystem;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    // ── In-memory store ─────────────────────────────────────────────────

    #[derive(Default)]
    struct MemStore {
        messages: Mutex<Vec<MessageRow>>,
        skills: Mutex<Vec<MappedSkillRow>>,
        clock: AtomicI64,
    }

    #[async_trait]
    impl ChatStore for MemStore {
        async fn create_session(
            &self,
            user_id: Uuid,
            name: Option<&str>,
        ) -> Result<ChatSessionRow> {
            Ok(test_session_for(user_id, name))
        }

        async fn get_session(&self, _session_id: Uuid) -> Result<Option<ChatSessionRow>> {
            Ok(None)
        }

        async fn append_message(
            &self,
            session_id: Uuid,
            role: MessageRole,
            content: &str,
            token_usage: i32,
            model_name: Option<&str>,
        ) -> Result<MessageRow> {
            let tick = self.clock.fetch_add(1, Ordering::SeqCst);
            let message = MessageRow {
                id: Uuid::new_v4(),
                session_id,
                role,
                content: content.to_string(),
                token_usage,
                model_name: model_name.map(str::to_string),
                timestamp: Utc::now() + Duration::milliseconds(tick),
            };
            self.messages.lock().unwrap().push(message.clone());
            Ok(message)
        }

        async fn session_messages(&self, session_id: Uuid) -> Result<Vec<MessageRow>> {
            let mut messages: Vec<MessageRow> = self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.session_id == session_id)
                .cloned()
                .collect();
            messages.sort_by_key(|m| m.timestamp);
            Ok(messages)
        }

        async fn save_mapped_skill(
            &self,
            session_id: Uuid,
            origin_message_id: Uuid,
            record: &SkillRecord,
        ) -> Result<MappedSkillRow> {
            let row = MappedSkillRow {
                id: Uuid::new_v4(),
                session_id,
                origin_message_id,
                skill_system: record.system.as_tag().to_string(),
                uri: record.uri.clone(),
                title: record.title.clone(),
                reference_language: record.reference_language.clone(),
                preferred_label: record.preferred_label.clone(),
                description: record.description.clone(),
                extra_links: record.links.clone(),
                created_at: Utc::now(),
            };
            self.skills.lock().unwrap().push(row.clone());
            Ok(row)
        }
    }

    // ── Mock gateway / framework ────────────────────────────────────────

    struct MockGateway {
        fail_reply: bool,
        extraction: Mutex<Option<Result<Vec<SkillPhrase>, GatewayError>>>,
        mapping: Mutex<Option<Result<Vec<PhraseMapping>, GatewayError>>>,
        extraction_called: AtomicBool,
    }

    impl MockGateway {
        fn new() -> Self {
            Self {
                fail_reply: false,
                extraction: Mutex::new(Some(Ok(Vec::new()))),
                mapping: Mutex::new(Some(Ok(Vec::new()))),
                extraction_called: AtomicBool::new(false),
            }
        }

        fn extracting(self, phrases: Vec<SkillPhrase>) -> Self {
            *self.extraction.lock().unwrap() = Some(Ok(phrases));
            self
        }

        fn mapping_to(self, mappings: Vec<PhraseMapping>) -> Self {
            *self.mapping.lock().unwrap() = Some(Ok(mappings));
            self
        }
    }

    #[async_trait]
    impl LanguageModelGateway for MockGateway {
        async fn generate_reply(&self, _history: &[ChatTurn]) -> Result<GatewayReply, GatewayError> {
            if self.fail_reply {
                return Err(GatewayError::Provider("connection refused".to_string()));
            }
            Ok(GatewayReply {
                content: "Tell me more about that!".to_string(),
                token_usage: 12,
                model_name: "mock-model".to_string(),
            })
        }

        async fn extract_skill_phrases(
            &self,
            _message_text: &str,
        ) -> Result<Vec<SkillPhrase>, GatewayError> {
            self.extraction_called.store(true, Ordering::SeqCst);
            self.extraction
                .lock()
                .unwrap()
                .take()
                .expect("extraction behavior consumed twice")
        }

        async fn map_phrases(
            &self,
            _batch: &[PhraseCandidates],
        ) -> Result<Vec<PhraseMapping>, GatewayError> {
            self.mapping
                .lock()
                .unwrap()
                .take()
                .expect("mapping behavior consumed twice")
        }
    }

    /// Per-query search results: `Some(candidates)` answers, `None` fails
    /// with `Unavailable`. Queries not listed return zero candidates.
    struct MockFramework {
        results: HashMap<String, Option<Vec<TaxonomyCandidate>>>,
    }

    #[async_trait]
    impl CompetencyFramework for MockFramework {
        async fn search(
            &self,
            query: &str,
            _limit: u32,
            _language: &str,
        ) -> Result<Vec<TaxonomyCandidate>, FrameworkError> {
            match self.results.get(query) {
                Some(Some(candidates)) => Ok(candidates.clone()),
                Some(None) => Err(FrameworkError::Unavailable("timeout".to_string())),
                None => Ok(Vec::new()),
            }
        }

        fn system(&self) -> SkillSystem {
            SkillSystem::Esco
        }
    }

    // ── Fixtures ────────────────────────────────────────────────────────

    fn test_session_for(user_id: Uuid, name: Option<&str>) -> ChatSessionRow {
        ChatSessionRow {
            id: Uuid::new_v4(),
            user_id,
            name: name.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_session() -> ChatSessionRow {
        test_session_for(Uuid::new_v4(), Some("New Chat Session"))
    }

    fn phrase(text: &str) -> SkillPhrase {
        SkillPhrase {
            phrase: text.to_string(),
            category: PhraseCategory::Other,
            confidence: 0.9,
            evidence: format!("mentioned {text}"),
        }
    }

    fn candidate(uri: &str, title: &str) -> TaxonomyCandidate {
        TaxonomyCandidate {
            uri: uri.to_string(),
            title: title.to_string(),
            reference_language: "en".to_string(),
            preferred_label: HashMap::from([("en".to_string(), title.to_string())]),
            description: HashMap::from([("en".to_string(), format!("The ability: {title}"))]),
            links: json!({}),
        }
    }

    fn mapping(phrase: &str, uri: Option<&str>) -> PhraseMapping {
        PhraseMapping {
            phrase: phrase.to_string(),
            uri: uri.map(str::to_string),
            confidence: 0.8,
        }
    }

    // ── Tests ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_empty_extraction_yields_zero_skills() {
        let store = MemStore::default();
        let llm = MockGateway::new().extracting(Vec::new());
        let framework = MockFramework {
            results: HashMap::new(),
        };
        let session = test_session();

        let outcome = run_chat_pipeline(&store, &llm, &framework, "en", &session, "Hello!")
            .await
            .unwrap();

        assert!(outcome.skills_processed);
        assert!(outcome.mapped_skills.is_empty());
        assert!(store.skills.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_food_drive_scenario_persists_two_skills() {
        // "I led a team of five volunteers organizing a food drive and used
        // Excel to track donations" → leadership and Excel map, volunteer
        // coordination finds no candidates.
        let store = MemStore::default();
        let llm = MockGateway::new()
            .extracting(vec![
                phrase("leadership"),
                phrase("Excel"),
                phrase("volunteer coordination"),
            ])
            .mapping_to(vec![
                mapping("leadership", Some("http://esco/lead")),
                mapping("Excel", Some("http://esco/excel")),
            ]);
        let framework = MockFramework {
            results: HashMap::from([
                (
                    "leadership".to_string(),
                    Some(vec![candidate("http://esco/lead", "lead a team")]),
                ),
                (
                    "Excel".to_string(),
                    Some(vec![candidate("http://esco/excel", "use spreadsheets")]),
                ),
                ("volunteer coordination".to_string(), Some(Vec::new())),
            ]),
        };
        let session = test_session();

        let outcome = run_chat_pipeline(
            &store,
            &llm,
            &framework,
            "en",
            &session,
            "I led a team of five volunteers organizing a food drive and used Excel to track donations",
        )
        .await
        .unwrap();

        assert!(outcome.skills_processed);
        assert_eq!(outcome.mapped_skills.len(), 2);
        for skill in &outcome.mapped_skills {
            assert_eq!(skill.origin_message_id, outcome.user_message.id);
            assert_eq!(skill.session_id, outcome.user_message.session_id);
            assert_eq!(skill.skill_system, "ESCO");
        }

        // user message then assistant reply, ascending timestamp
        let messages = store.session_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_unparseable_extraction_degrades_to_zero_skills() {
        let store = MemStore::default();
        let llm = MockGateway::new();
        *llm.extraction.lock().unwrap() = Some(Err(GatewayError::MalformedResponse(
            "not json".to_string(),
        )));
        let framework = MockFramework {
            results: HashMap::new(),
        };
        let session = test_session();

        let outcome = run_chat_pipeline(&store, &llm, &framework, "en", &session, "Hello!")
            .await
            .unwrap();

        // extraction errors are not failures: the reply stands and the
        // message simply carries no skills
        assert!(outcome.skills_processed);
        assert!(outcome.mapped_skills.is_empty());

        let messages = store.session_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_ne!(messages[1].content, DEGRADED_REPLY);
    }

    #[tokio::test]
    async fn test_repeated_phrase_text_resolves_consistently() {
        // identical extracted phrases share a search query and candidate
        // set; each mapping entry still persists its own row
        let store = MemStore::default();
        let llm = MockGateway::new()
            .extracting(vec![phrase("Excel"), phrase("Excel")])
            .mapping_to(vec![
                mapping("Excel", Some("http://esco/excel")),
                mapping("Excel", Some("http://esco/excel")),
            ]);
        let framework = MockFramework {
            results: HashMap::from([(
                "Excel".to_string(),
                Some(vec![candidate("http://esco/excel", "use spreadsheets")]),
            )]),
        };
        let session = test_session();

        let outcome = run_chat_pipeline(&store, &llm, &framework, "en", &session, "msg")
            .await
            .unwrap();

        assert_eq!(outcome.mapped_skills.len(), 2);
        assert!(outcome
            .mapped_skills
            .iter()
            .all(|s| s.uri == "http://esco/excel"));
    }

    #[tokio::test]
    async fn test_framework_failure_isolated_per_phrase() {
        let store = MemStore::default();
        let llm = MockGateway::new()
            .extracting(vec![phrase("welding"), phrase("teamwork")])
            .mapping_to(vec![mapping("teamwork", Some("http://esco/team"))]);
        let framework = MockFramework {
            results: HashMap::from([
                ("welding".to_string(), None), // search unavailable
                (
                    "teamwork".to_string(),
                    Some(vec![candidate("http://esco/team", "work in teams")]),
                ),
            ]),
        };
        let session = test_session();

        let outcome = run_chat_pipeline(&store, &llm, &framework, "en", &session, "msg")
            .await
            .unwrap();

        assert_eq!(outcome.mapped_skills.len(), 1);
        assert_eq!(outcome.mapped_skills[0].uri, "http://esco/team");
    }

    #[tokio::test]
    async fn test_reply_failure_degrades_and_skips_extraction() {
        let store = MemStore::default();
        let mut llm = MockGateway::new();
        llm.fail_reply = true;
        let framework = MockFramework {
            results: HashMap::new(),
        };
        let session = test_session();

        let outcome = run_chat_pipeline(&store, &llm, &framework, "en", &session, "Hello!")
            .await
            .unwrap();

        assert!(!outcome.skills_processed);
        assert!(outcome.mapped_skills.is_empty());
        assert_eq!(outcome.assistant_message.content, DEGRADED_REPLY);
        assert!(!llm.extraction_called.load(Ordering::SeqCst));

        // only the user message and the degraded placeholder were persisted
        let messages = store.session_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, DEGRADED_REPLY);
    }

    #[tokio::test]
    async fn test_malformed_mapping_drops_all_skills() {
        let store = MemStore::default();
        let llm = MockGateway::new().extracting(vec![phrase("leadership")]);
        *llm.mapping.lock().unwrap() = Some(Err(GatewayError::MalformedResponse(
            "not json".to_string(),
        )));
        let framework = MockFramework {
            results: HashMap::from([(
                "leadership".to_string(),
                Some(vec![candidate("http://esco/lead", "lead a team")]),
            )]),
        };
        let session = test_session();

        let outcome = run_chat_pipeline(&store, &llm, &framework, "en", &session, "msg")
            .await
            .unwrap();

        assert!(outcome.skills_processed);
        assert!(outcome.mapped_skills.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_uris_persist_independently() {
        let store = MemStore::default();
        let llm = MockGateway::new()
            .extracting(vec![phrase("leading people"), phrase("team leadership")])
            .mapping_to(vec![
                mapping("leading people", Some("http://esco/lead")),
                mapping("team leadership", Some("http://esco/lead")),
            ]);
        let framework = MockFramework {
            results: HashMap::from([
                (
                    "leading people".to_string(),
                    Some(vec![candidate("http://esco/lead", "lead a team")]),
                ),
                (
                    "team leadership".to_string(),
                    Some(vec![candidate("http://esco/lead", "lead a team")]),
                ),
            ]),
        };
        let session = test_session();

        let outcome = run_chat_pipeline(&store, &llm, &framework, "en", &session, "msg")
            .await
            .unwrap();

        assert_eq!(outcome.mapped_skills.len(), 2);
        assert_eq!(outcome.mapped_skills[0].uri, outcome.mapped_skills[1].uri);
        assert_ne!(outcome.mapped_skills[0].id, outcome.mapped_skills[1].id);
    }

    #[tokio::test]
    async fn test_unoffered_uri_is_dropped() {
        let store = MemStore::default();
        let llm = MockGateway::new()
            .extracting(vec![phrase("leadership")])
            .mapping_to(vec![mapping("leadership", Some("http://esco/invented"))]);
        let framework = MockFramework {
            results: HashMap::from([(
                "leadership".to_string(),
                Some(vec![candidate("http://esco/lead", "lead a team")]),
            )]),
        };
        let session = test_session();

        let outcome = run_chat_pipeline(&store, &llm, &framework, "en", &session, "msg")
            .await
            .unwrap();

        assert!(outcome.mapped_skills.is_empty());
    }
}
