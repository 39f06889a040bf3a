//! roomchat relay server: in-memory chat rooms over WebSocket.
//!
//! An axum WebSocket server that keeps a registry of rooms, their members,
//! and a bounded message backlog, and relays chat and typing events between
//! the members of each room. Nothing is persisted.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:4000
//! cargo run --bin roomchat-relay
//!
//! # Run on custom address
//! cargo run --bin roomchat-relay -- --bind 127.0.0.1:8080
//!
//! # Or just pick the port
//! PORT=5000 cargo run --bin roomchat-relay
//! ```

use std::sync::Arc;

use clap::Parser;
use roomchat_relay::config::{RelayCliArgs, RelayConfig};
use roomchat_relay::relay::{self, RelayState};

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
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
        backlog_capacity = config.backlog_capacity,
        "starting roomchat relay server"
    );

    let state = Arc::new(RelayState::with_config(
        config.max_payload_size,
        config.backlog_capacity,
    ));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
