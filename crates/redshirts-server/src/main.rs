//! # redshirts-server
//!
//! Message service for The Red Shirts lobbies.
//!
//! This binary provides:
//! - **REST API** (axum) for posting and polling per-lobby messages
//! - **Membership checks** against the lobby service on every operation,
//!   plus last-refresh reporting on each successful poll
//! - **Join/leave markers** recorded by the lobby service, which anchor a
//!   player's first poll
//! - **Scavenger** that purges messages past the retention window

mod api;
mod config;
mod context;
mod error;
mod lobby;
mod scavenger;
mod service;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use redshirts_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::lobby::LobbyClient;
use crate::scavenger::Scavenger;
use crate::service::MessageService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,redshirts_server=debug")),
        )
        .init();

    info!("Starting Red Shirts message server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env()?;
    info!(?config, "Loaded configuration");
    if config.service_token.is_none() {
        tracing::warn!("SERVICE_TOKEN not set, join/leave endpoints are disabled");
    }

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    info!(path = %config.database_path.display(), "Opened message database");

    let lobby = Arc::new(LobbyClient::new(
        config.lobby_service_url.clone(),
        config.lobby_timeout,
    )?);

    let app_state = AppState {
        service: MessageService::new(db.clone(), lobby),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------
    let scavenger = Scavenger::new(db, config.retention, config.scavenge_interval).spawn();

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let result = tokio::select! {
        result = api::serve(app_state, config.http_addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    scavenger.abort();

    if let Err(e) = &result {
        tracing::error!(error = %e, "HTTP server failed");
    }
    result
}
