//! Self-registering microservice mesh control plane.
//!
//! Services announce themselves and their callable operations to a shared
//! registry over the message bus; the gateway dynamically wires HTTP and
//! WebSocket routes to those operations; a heartbeat monitor evicts
//! unreachable services and retracts their routes.

pub mod cluster;
pub mod config;
pub mod discovery;
pub mod gateway;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod routing;
pub mod ws;

pub use cluster::Cluster;
pub use config::MeshConfig;
pub use discovery::DiscoveryClient;
pub use gateway::GatewayServer;
pub use lifecycle::Shutdown;
pub use registry::{Operation, OperationType, ServiceInfo, ServiceRegistry};
