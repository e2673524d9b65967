//! tandem server - room relay daemon

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use tandem_utils::{ensure_all_dirs, paths, LogConfig, Result};

mod config;
mod listener;
mod registry;
mod session;

use config::ConfigLoader;
use registry::RoomRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    tandem_utils::init_logging_with_config(LogConfig::server())?;
    run_daemon().await
}

async fn run_daemon() -> Result<()> {
    info!("tandem server starting");

    let app_config = ConfigLoader::load_and_validate()?;
    ensure_all_dirs()?;

    let registry = Arc::new(RoomRegistry::new(app_config.server.room_capacity));
    let (shutdown_tx, _) = broadcast::channel(1);

    let socket_path = app_config
        .server
        .socket_path
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(paths::socket_path);

    // Remove a stale socket left behind by a previous run
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }

    if let Err(e) = std::fs::write(paths::pid_file(), std::process::id().to_string()) {
        warn!("Failed to write pid file: {}", e);
    }

    let unix_handle = tokio::spawn(listener::run_unix_accept_loop(
        socket_path.clone(),
        Arc::clone(&registry),
        shutdown_tx.subscribe(),
        app_config.server.outbound_buffer,
    ));

    let tcp_handle = app_config.server.tcp_listen.clone().map(|addr| {
        tokio::spawn(listener::run_tcp_accept_loop(
            addr,
            Arc::clone(&registry),
            shutdown_tx.subscribe(),
            app_config.server.outbound_buffer,
        ))
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(());
    let _ = unix_handle.await;
    if let Some(handle) = tcp_handle {
        let _ = handle.await;
    }

    let _ = std::fs::remove_file(&socket_path);
    let _ = std::fs::remove_file(paths::pid_file());
    info!("tandem server stopped");
    Ok(())
}
