//! factom-walletd - Factom wallet daemon
//!
//! Holds Factoid and Entry Credit keys and serves them over JSON-RPC 2.0.

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use walletd_server::{Config, Metrics, Server, ServerConfig};
use walletd_wallet::{FixedRate, Wallet};

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if WALLETD_CONFIG is set, then env overrides)
    let config_path = std::env::var("WALLETD_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(ref path) = config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // An explicitly named file must load
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting factom-walletd");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  EC rate: {} factoshis", config.wallet.ec_rate);

    let wallet = match config.wallet.path {
        Some(ref path) => {
            tracing::info!("  Wallet file: {}", path.display());
            Arc::new(Wallet::open(path)?)
        }
        None => {
            tracing::warn!("  Wallet file: none (keys are lost on exit)");
            Arc::new(Wallet::in_memory())
        }
    };
    tracing::info!("  Addresses: {}", wallet.address_count());

    let mut server_config = ServerConfig::from_config(&config);
    if config.metrics.enabled {
        server_config = server_config.with_metrics(Arc::new(Metrics::new()?));
        tracing::info!("  Metrics: enabled");
    } else {
        tracing::info!("  Metrics: disabled");
    }

    let rate = Arc::new(FixedRate::new(config.wallet.ec_rate));
    let server = Arc::new(Server::new(server_config, wallet.clone(), rate));

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    if !server.wait_for_drain(DRAIN_TIMEOUT).await {
        tracing::warn!("Connections still open after {:?}", DRAIN_TIMEOUT);
    }

    if let Err(e) = wallet.close() {
        tracing::error!("Failed to close wallet: {}", e);
    }

    tracing::info!("Server stopped");
    Ok(())
}
