//! parley-server: username-keyed chat relay.
//!
//! Accepts WebSocket connections, authenticates clients by username,
//! persists every message to an append-only log, and broadcasts each one
//! to every live connection.

mod config;
mod registry;
mod relay;
mod server;
mod store;
mod transport;

use clap::Parser;
use config::ServerConfig;
use server::ChatServer;
use std::path::PathBuf;
use tracing::{error, info};

/// parley-server — chat relay server
#[derive(Parser, Debug)]
#[command(name = "parley-server", version, about = "Chat relay server")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Data directory for the user directory and message log
    #[arg(long)]
    data_dir: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.parley/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting parley-server"
    );

    // Load server config (file + CLI overrides)
    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(
        Some(&config_path),
        cli.port,
        cli.data_dir.as_deref(),
    ) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let chat_server = match ChatServer::new(server_config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create server");
            std::process::exit(1);
        }
    };

    let (_addr, accept_loop) = match chat_server.spawn().await {
        Ok(spawned) => spawned,
        Err(e) => {
            error!(error = %e, "failed to start listener");
            std::process::exit(1);
        }
    };

    // Run until shutdown signal
    tokio::select! {
        result = accept_loop => {
            if let Err(e) = result {
                error!(error = %e, "accept loop terminated");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("parley-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
