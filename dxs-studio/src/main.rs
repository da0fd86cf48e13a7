//! dxs-studio - DrumExtract Studio orchestrator
//!
//! Drives one session through drum separation and MIDI transcription on a
//! remote engine, and exposes it over HTTP REST + SSE.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dxs_common::events::EventBus;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dxs_studio::config::{ConfigOverrides, StudioConfig};
use dxs_studio::services::{EngineGateway, HttpEngineGateway, SessionMachine};
use dxs_studio::AppState;

/// How long shutdown waits for the engine to acknowledge a cancellation
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Command-line arguments for dxs-studio
#[derive(Parser, Debug)]
#[command(name = "dxs-studio")]
#[command(about = "Drum separation and MIDI transcription studio")]
#[command(version)]
struct Args {
    /// Config file (default: <config_dir>/dxs/dxs-studio.toml, or $DXS_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "DXS_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "DXS_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// Base URL of the separation/transcription engine
    #[arg(long, env = "DXS_ENGINE_URL")]
    engine_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = StudioConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?
        .apply_overrides(ConfigOverrides {
            port: args.port,
            bind_address: args.bind_address,
            engine_url: args.engine_url,
        })
        .context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting dxs-studio");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Engine: {}", config.engine.base_url);

    let gateway = HttpEngineGateway::new(&config.engine.base_url, config.request_timeout())
        .context("Failed to create engine gateway")?;
    let gateway: Arc<dyn EngineGateway> = Arc::new(gateway);

    // Create event bus for SSE broadcasting
    let event_bus = EventBus::new(100);
    let machine = SessionMachine::new(gateway, config.tracker_config(), event_bus);

    let state = AppState::new(machine.clone(), &config);
    let app = dxs_studio::build_router(state);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Cancels any engine job still in flight
    machine.shutdown(SHUTDOWN_GRACE).await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
