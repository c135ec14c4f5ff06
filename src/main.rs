use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use botroom::{llm, server, state::AppState};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botroom=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting botroom...");

    // Initialize LLM providers
    let llm_config = llm::LlmConfig::from_env();
    let llm_manager = match llm_config.build_manager() {
        Ok(manager) => {
            tracing::info!(
                "LLM providers initialized: {}",
                manager.provider_names().join(", ")
            );
            Some(manager)
        }
        Err(e) => {
            tracing::warn!("Failed to initialize LLM providers: {}. Mentions will fail.", e);
            None
        }
    };

    let catalog = match llm_config.build_catalog() {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::warn!("Invalid LLM_CATALOG: {}. No bots can be added.", e);
            llm::ModelCatalog::default()
        }
    };
    tracing::info!("Bot catalog: [{}]", catalog.names().join(", "));

    let state = Arc::new(AppState::new_with_llm(llm_manager, llm_config, catalog));
    let app = server::build_router(state);

    let addr = server::ServerConfig::from_env().socket_addr();
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
