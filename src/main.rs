use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use session_keeper::{http, RedisDatabase, SessionManager, Settings, StoreConfiguration};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "session-keeper", version, about)]
struct Args {
    /// Configuration file (defaults to config/default.toml when present)
    #[arg(long, env = "SESSION_KEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_keeper=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let settings =
        Settings::load(args.config.as_deref()).context("Failed to load configuration")?;

    let host = args.host.unwrap_or_else(|| settings.server.host.clone());
    let port = args.port.unwrap_or(settings.server.port);

    let store = RedisDatabase::with_configuration(
        &settings.redis.url,
        StoreConfiguration::with_key_prefix(settings.redis.key_prefix.clone()),
    )
    .await
    .context("Failed to connect to Redis")?;
    info!("Connected to Redis");

    let manager = Arc::new(SessionManager::new(store, settings.session.clone()));
    let app = http::router(manager);

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        default_ttl_seconds = settings.session.default_ttl_seconds,
        "Starting session service"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Session service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
