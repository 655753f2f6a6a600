//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Respect RUST_LOG when set, fall back to the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging. `level` is the fallback when RUST_LOG is unset.
pub fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mesh_gateway={level},tower_http=warn").into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
