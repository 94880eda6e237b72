use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use tracker_api::config::Config;
use tracker_api::routes;
use tracker_api::state::AppStateInner;
use tracker_api::witness::LogNotifier;
use tracker_db::Database;

const DEFAULT_LOG_FILTER: &str = concat!(
    "tracker_server=debug,",
    "tracker_api=debug,",
    "tracker_db=debug,",
    "tower_http=debug",
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_placeholder_secret() {
        warn!("TRACKER_JWT_SECRET is unset or still a placeholder; tokens are forgeable");
    }

    let db = Database::open(&config.db_path)?;
    let state = AppStateInner::new(db, &config, Arc::new(LogNotifier)).await?;
    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Tracker server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
