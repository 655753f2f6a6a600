//! Configuration subsystem.
//!
//! # Responsibilities
//! - Define the configuration schema (serde structs with defaults)
//! - Load configuration from TOML files
//! - Validate semantic constraints before the config is accepted
//!
//! # Design Decisions
//! - Every well-known bus address and map key lives here and is passed to
//!   components at construction; there are no mutable globals
//! - Validation returns all errors, not just the first

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    GatewayConfig, ListenerConfig, MeshConfig, ObservabilityConfig, RegistryConfig, WsConfig,
};
pub use validation::{validate_config, ValidationError};
