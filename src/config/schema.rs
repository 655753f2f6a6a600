//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mesh
//! gateway. All types derive Serde traits for deserialization from config
//! files; every field has a default so a bare file is valid.

use serde::{Deserialize, Serialize};

/// Root configuration for the mesh gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MeshConfig {
    /// Listener configuration (bind address, backpressure).
    pub listener: ListenerConfig,

    /// Service registry and heartbeat settings.
    pub registry: RegistryConfig,

    /// WebSocket endpoint registry settings.
    pub ws: WsConfig,

    /// Entry-point router settings.
    pub gateway: GatewayConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Service registry configuration.
///
/// The `*_path` fields are the well-known bus addresses. They are plumbed
/// through explicitly rather than read from globals so tests can run
/// several registries side by side.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Age in milliseconds after which a silent entry is swept.
    pub expiration_age_ms: u64,

    /// Interval between heartbeat probe rounds in milliseconds.
    pub ping_interval_ms: u64,

    /// Interval between expiration sweeps in milliseconds. Zero disables
    /// sweeping (probing alone drives eviction).
    pub sweep_interval_ms: u64,

    /// Per-probe reply timeout in milliseconds.
    pub timeout_ms: u64,

    /// Consecutive failed probes before a service is evicted.
    pub unhealthy_threshold: i64,

    /// Event address a registration is announced on.
    pub register_path: String,

    /// Event address an eviction is announced on.
    pub unregister_path: String,

    /// Request address for directory queries.
    pub registry_get_path: String,

    /// Request address services register themselves on.
    pub registry_register_path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            expiration_age_ms: 60_000,
            ping_interval_ms: 10_000,
            sweep_interval_ms: 0,
            timeout_ms: 2_000,
            unhealthy_threshold: 2,
            register_path: "service-register".to_string(),
            unregister_path: "service-unregister".to_string(),
            registry_get_path: "service-registry-get".to_string(),
            registry_register_path: "service-registry-register".to_string(),
        }
    }
}

/// WebSocket endpoint registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WsConfig {
    /// Address for unicast replies to the originating socket.
    pub reply_path: String,

    /// Address for fan-out to every socket on the url.
    pub reply_all_path: String,

    /// Address for fan-out excluding the sender.
    pub reply_all_but_sender_path: String,

    /// Bound on holder lock acquisition in milliseconds.
    pub lock_timeout_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            reply_path: "ws-reply".to_string(),
            reply_all_path: "ws-reply-to-all".to_string(),
            reply_all_but_sender_path: "ws-reply-to-all-but-sender".to_string(),
            lock_timeout_ms: 90_000,
        }
    }
}

/// Entry-point router configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host advertised in fully-qualified operation URLs.
    pub host: String,

    /// Port advertised in fully-qualified operation URLs.
    pub port: u16,

    /// Whether WebSocket endpoint state is replicated across nodes.
    pub clustered: bool,

    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Timeout for bus dispatch of a matched request, in milliseconds.
    pub dispatch_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            clustered: false,
            request_timeout_secs: 30,
            dispatch_timeout_ms: 5_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
