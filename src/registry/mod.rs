//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! Service ──register──▶ bus(registry_register_path) ──▶ ServiceRegistry
//!     ──▶ directory holder (replicated map, CAS replace)
//!     ──▶ publish register event ──▶ entry-point router binds routes
//!
//! HeartbeatMonitor ──ping──▶ "<serviceName>-info" (bounded timeout)
//!     failure threshold reached ──▶ evict + publish unregister event
//! ```
//!
//! # Design Decisions
//! - The whole directory lives under one well-known map key; every
//!   read-modify-write uses versioned compare-and-swap with bounded retries
//! - Exactly one node schedules the heartbeat loop (lock hold election)
//! - The registry never touches routing state; register/unregister events
//!   are the only channel to the router

pub mod heartbeat;
pub mod model;
#[allow(clippy::module_inception)]
pub mod registry;

pub use heartbeat::HeartbeatMonitor;
pub use model::{now_millis, Operation, OperationType, ServiceInfo, ServiceInfoHolder};
pub use registry::{QueryReply, RegistryError, ServiceQuery, ServiceRegistry, SERVICE_HOLDER_KEY};
