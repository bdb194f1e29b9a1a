//! Main Entrypoint for the VoicePulse API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the agent registry, applying any prompt overrides.
//! 3. Initializing shared services (credentials, realtime, tools, supervisor).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use voicepulse_api::{config::Config, router::create_router, state::AppState};
use voicepulse_core::{
    agents::{AgentRegistry, SUPERVISOR_TOOLS, load_prompts},
    credential::OpenAiSessionMinter,
    llm_client::OpenAIReasoningClient,
    mcp_client::{McpHttpClient, SurveyBackend},
    realtime::OpenAiRealtimeConnector,
    supervisor::Supervisor,
    tools::{ToolExecutor, descriptor_for},
};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Build Agent Registry ---
    let mut agents = AgentRegistry::builtin();
    if let Some(prompts_path) = &config.prompts_path {
        let prompts = load_prompts(prompts_path)?;
        info!(count = prompts.len(), path = %prompts_path.display(), "Loaded prompt overrides.");
        agents = agents.with_prompt_overrides(&prompts);
    }
    info!(agent_configs = ?agents.keys(), "Agent registry ready.");

    // --- 4. Initialize Shared Services ---
    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.openai_api_key)
        .with_api_base(&config.openai_api_base);
    let reasoning = Arc::new(OpenAIReasoningClient::new(
        openai_config,
        config.supervisor_model.clone(),
    ));

    let survey: Arc<dyn SurveyBackend> = Arc::new(McpHttpClient::new(&config.mcp_server_url));
    let tools = Arc::new(ToolExecutor::new(survey.clone()));
    let supervisor_tools = SUPERVISOR_TOOLS
        .iter()
        .filter_map(|name| descriptor_for(name))
        .collect();
    let supervisor = Arc::new(
        Supervisor::new(
            reasoning,
            tools.clone(),
            agents.supervisor_instructions(),
            supervisor_tools,
        )
        .with_max_iterations(config.supervisor_max_iterations),
    );

    let credentials = Arc::new(OpenAiSessionMinter::new(
        &config.openai_api_key,
        &config.openai_api_base,
        &config.realtime_model,
        &config.realtime_voice,
    ));
    let connector = Arc::new(OpenAiRealtimeConnector::new(
        &config.realtime_url,
        &config.realtime_model,
    ));

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        agents: Arc::new(agents),
        credentials,
        connector,
        survey,
        tools,
        supervisor,
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        realtime_model = %config.realtime_model,
        supervisor_model = %config.supervisor_model,
        mcp_server = %config.mcp_server_url,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
