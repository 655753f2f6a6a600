//! Mesh gateway entry point.
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                 MESH GATEWAY                  │
//!                      │                                               │
//!  HTTP / WS traffic ──┼─▶ dispatch ──▶ route matcher ──▶ message bus ─┼──▶ services
//!                      │                    ▲                          │
//!  register requests ──┼─▶ service registry ┘ (bind/retract on events) │
//!                      │        │                                      │
//!                      │        └─ heartbeat monitor (evict on silence)│
//!                      └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use tokio::net::TcpListener;

use mesh_gateway::config::{load_config, MeshConfig};
use mesh_gateway::{Cluster, GatewayServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => load_config(&path)?,
        None => MeshConfig::default(),
    };

    mesh_gateway::observability::logging::init_logging(&config.observability.log_level);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        clustered = config.gateway.clustered,
        ping_interval_ms = config.registry.ping_interval_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => mesh_gateway::observability::metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let cluster = Cluster::new();
    let server = GatewayServer::new(config, cluster);

    let ctrl_c = tokio::spawn(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    tokio::select! {
        result = server.run(listener, &shutdown) => result?,
        _ = ctrl_c => {
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
