//! Server entrypoint
//!
//! Loads configuration, wires the adapter stack, and serves the
//! OpenAI-compatible HTTP surface until shutdown.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod metrics;
mod openai;
mod rate_limit;
mod routes;
mod state;

use proxy_infrastructure::ConfigLoader;
use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "agent-proxy", about = "OpenAI-compatible agent proxy for local model servers")]
struct Cli {
    /// Path to a TOML config file (default: agent-proxy.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configured one (e.g. 0.0.0.0:11223)
    #[arg(short, long)]
    bind: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = ConfigLoader::load(cli.config.as_ref()).context("failed to load configuration")?;
    let bind = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.bind_address, config.server.port));
    info!(
        backend = %config.backend.base_url,
        workspace = %config.workspace.root,
        "starting agent-proxy"
    );

    let state = AppState::from_config(config)?;
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(address = %bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    // SIGTERM matters for container stops; ctrl-c for the terminal.
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(_) => return std::future::pending().await,
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
