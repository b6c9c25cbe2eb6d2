use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod agent;
mod ai;
mod api;
mod auth;
mod config;
mod db;
mod error;
mod files;

use agent::ledger::ConversationLedger;
use agent::orchestrator::Orchestrator;
use agent::prompts::SystemPrompts;
use ai::registry::ProviderRegistry;
use auth::roles::RoleSet;
use auth::IdentityStore;
use config::AppConfig;
use files::FileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("🤖 Starting Studio Assist Gateway...");

    // Load config
    let config = AppConfig::from_env()?;
    tracing::info!(
        "Config loaded. Default target: {}/{}",
        config.default_provider,
        config.default_model
    );

    // Open the stores
    let identity = Arc::new(
        IdentityStore::open(&config.users_file, RoleSet::builtin(), &config.admin_usernames).await?,
    );
    let ledger = Arc::new(ConversationLedger::open(&config.history_file, &config.logs_file).await?);
    let files = FileStore::open(&config.uploads_dir).await?;

    // Providers share one HTTP client
    let client = ai::llm::http_client(config.upstream_timeout())?;
    let registry = Arc::new(ProviderRegistry::new(
        ProviderRegistry::builtin_catalog(&config),
        client,
    ));
    tracing::info!(
        "Providers ready: {}",
        registry.list_models(None).keys().cloned().collect::<Vec<_>>().join(", ")
    );

    let prompts = SystemPrompts::builtin();
    tracing::info!(
        "System prompts: {}",
        prompts.keys().collect::<Vec<_>>().join(", ")
    );

    let orchestrator = Orchestrator::new(
        identity.clone(),
        ledger.clone(),
        registry.clone(),
        prompts,
        config.default_provider.clone(),
        config.default_model.clone(),
    );

    // Build shared application state
    let state = Arc::new(api::AppState {
        identity,
        ledger,
        registry,
        files,
        orchestrator,
    });

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
    }
}
