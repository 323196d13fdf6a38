mod auth;
mod chat;
mod config;
mod db;
mod errors;
mod framework;
mod llm;
mod models;
mod routes;
mod sessions;
mod state;
mod users;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::chat::store::PgChatStore;
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::framework::EscoClient;
use crate::llm::OpenAiGateway;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Loqui API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    // Initialize the LLM gateway
    let llm = Arc::new(OpenAiGateway::with_base_url(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.openai_base_url.clone(),
    ));
    info!("LLM gateway initialized (model: {})", config.openai_model);

    // Initialize the ESCO framework adapter
    let framework = Arc::new(EscoClient::new(config.esco_base_url.clone()));
    info!(
        "ESCO adapter initialized ({}, language: {})",
        config.esco_base_url, config.esco_language
    );

    // Persistence boundary for the chat pipeline
    let store = Arc::new(PgChatStore::new(db.clone()));

    // Build app state
    let state = AppState {
        db,
        llm,
        framework,
        store,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
