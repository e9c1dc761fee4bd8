use std::sync::Arc;
use tokio::net::TcpListener;

use gateway_server::auth::jwt::JwtSessionValidator;
use gateway_server::config::{generate_config_template, Config};
use gateway_server::routes;
use gateway_server::state::AppState;
use gateway_server::store::MemoryTopicStore;
use gateway_server::ws::connection::CloseReason;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gateway_server=info"))
    };
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter())
            .init();
    }

    tracing::info!(
        "Gateway server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.session_secret.is_empty() {
        return Err("session_secret is not set (use --session-secret or GATEWAY_SESSION_SECRET)".into());
    }

    let sessions = Arc::new(JwtSessionValidator::new(config.session_secret.as_bytes()));
    // Membership is pushed in by the application through the store's mutators.
    let store = Arc::new(MemoryTopicStore::new());

    let app_state = AppState::new(
        config.gateway.clone(),
        config.presence_enabled,
        sessions,
        store,
    );
    tracing::info!(
        heartbeat_interval_secs = config.gateway.heartbeat_interval_secs,
        heartbeat_grace_secs = config.gateway.heartbeat_grace_secs,
        topic_buckets = app_state.topics.bucket_count(),
        presence_enabled = config.presence_enabled,
        "Gateway configured"
    );

    let app = routes::build_router(app_state.clone());

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    let registry = app_state.connections.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!(connections = registry.len(), "Shutting down");
            registry.close_all(CloseReason::shutdown());
        })
        .await?;

    Ok(())
}
