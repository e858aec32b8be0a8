//! # Relay Server
//!
//! Real-time WebSocket broadcast hub.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (0.0.0.0:12345, endpoint /ws)
//! relay
//!
//! # Run with environment variables
//! RELAY_PORT=8080 RELAY_HOST=127.0.0.1 relay
//! ```
//!
//! A `relay.toml` in the working directory, `/etc/relay/` or
//! `~/.config/relay/` is picked up automatically.

use anyhow::Result;
use relay_server::{config, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relay_server=info,relay_core=info,relay_transport=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Relay server on {}:{}", config.host, config.port);

    if config.metrics.enabled {
        metrics::init_metrics();
    }

    relay_server::run_server(config).await?;

    Ok(())
}
