use std::sync::Arc;

use sqlx::PgPool;

use crate::chat::store::ChatStore;
use crate::config::Config;
use crate::framework::CompetencyFramework;
use crate::llm::LanguageModelGateway;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// The gateway, framework, and store are trait objects so tests (and any
/// future second provider/taxonomy) can swap implementations without
/// touching the pipeline.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub llm: Arc<dyn LanguageModelGateway>,
    pub framework: Arc<dyn CompetencyFramework>,
    pub store: Arc<dyn ChatStore>,
    pub config: Config,
}
