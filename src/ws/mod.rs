//! WebSocket endpoint registry.
//!
//! # Data Flow
//! ```text
//! Socket connects on /chat
//!     → registry.register(): holder += WsEndpoint{text_id, binary_id, url}
//!
//! Service replies with a WsMessageWrapper
//!     audience SENDER          → unicast to the wrapper's endpoint address
//!     audience ALL             → every endpoint whose url matches
//!     audience ALL_BUT_SENDER  → same, minus the structurally-equal sender
//! ```
//!
//! # Design Decisions
//! - Sockets never cross nodes; their bus addresses do. Relay needs only
//!   the address tokens from the shared holder
//! - One registry type; local and clustered constructors differ only in
//!   the backing map, locking is uniform

pub mod endpoint;
#[allow(clippy::module_inception)]
pub mod registry;

pub use endpoint::{Audience, PayloadKind, WsEndpoint, WsEndpointHolder, WsMessageWrapper};
pub use registry::{WsEndpointRegistry, WsRegistryError, WS_HOLDER_KEY};
