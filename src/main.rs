use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use llm_relay::logging::init_logging;
use llm_relay::server::{self, AppState, RateLimits};
use llm_relay::{
    AppConfig, ChatService, JsonFileSnapshots, ProviderRouter, SessionStore, SessionSweeper,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    config.validate().context("invalid configuration")?;

    init_logging(&config.log_level, config.log_format);

    let store = Arc::new(SessionStore::with_limits(config.session_limits()));
    let router = Arc::new(ProviderRouter::new(config.router_config()));

    let mut chat = ChatService::new(Arc::clone(&store), router)
        .with_context_window(config.context_window);
    if let Some(dir) = &config.snapshot_dir {
        let snapshots = JsonFileSnapshots::open(dir)
            .await
            .with_context(|| format!("failed to open snapshot directory {}", dir.display()))?;
        info!(dir = %dir.display(), "Session snapshots enabled");
        chat = chat.with_snapshots(Arc::new(snapshots));
    }

    let mut state = AppState::new(Arc::new(chat));
    match &config.admin_key {
        Some(key) => state = state.with_admin_key(key.as_str()),
        None => warn!("ADMIN_KEY is not set; admin routes will reject every request"),
    }

    let limits = RateLimits {
        general: config.general_rate_limit,
        chat: config.chat_rate_limit,
        window: config.rate_limit_window(),
    };
    let app = server::router(state, limits);

    let sweeper = SessionSweeper::spawn(Arc::clone(&store), config.sweep_interval());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Server running");
    info!("Health check: http://localhost:{}/api/health", config.port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    sweeper.shutdown().await;
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
