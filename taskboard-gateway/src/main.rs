//! `Taskboard` gateway -- real-time kanban gateway for a replicated
//! task store.
//!
//! Bridges web clients and a primary/standby pair of task-store nodes:
//! mutations go out over a binary TCP protocol with one-shot failover,
//! and resulting board events fan out to WebSocket subscribers.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080
//! cargo run --bin taskboard-gateway
//!
//! # Custom bind address and backend pair
//! cargo run --bin taskboard-gateway -- \
//!     --bind 127.0.0.1:3000 --primary 10.0.0.1:12345 --standby 10.0.0.2:12346
//! ```

use std::sync::Arc;

use clap::Parser;
use taskboard_gateway::backend::BackendSession;
use taskboard_gateway::config::{GatewayCliArgs, GatewayConfig};
use taskboard_gateway::events::EventBroadcaster;
use taskboard_gateway::failover::FailoverDirector;
use taskboard_gateway::gateway::TaskGateway;
use taskboard_gateway::server;

/// Client id the gateway presents to the backend protocol.
const GATEWAY_CLIENT_ID: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = GatewayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match GatewayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        primary = %config.primary_addr,
        standby = %config.standby_addr,
        "starting taskboard gateway"
    );

    let director = Arc::new(FailoverDirector::new(
        config.primary_addr.clone(),
        config.standby_addr.clone(),
    ));
    let session = BackendSession::with_timeout(director, config.call_timeout);
    let broadcaster = Arc::new(EventBroadcaster::new());
    let gateway = TaskGateway::new(
        session,
        Arc::clone(&broadcaster),
        GATEWAY_CLIENT_ID,
        config.board_id.clone(),
    );

    // Probe the backend once at startup so a misconfigured pair is visible
    // immediately instead of on the first client mutation.
    match gateway.fetch_board(&config.board_id).await {
        Ok(board) => {
            tracing::info!(board = %board.board_id, tasks = board.tasks.len(), "backend reachable");
        }
        Err(e) => tracing::warn!(error = %e, "backend probe failed"),
    }

    match server::start_server(&config.bind_addr, broadcaster).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "event server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "event server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start event server");
            std::process::exit(1);
        }
    }
}
