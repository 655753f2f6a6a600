//! Shared cluster fabric.
//!
//! # Responsibilities
//! - String-addressed message bus (unicast send, broadcast publish,
//!   request/reply with timeout)
//! - Versioned shared key-value map with compare-and-swap replace
//! - Named locks with bounded acquisition
//! - Named counters (heartbeat failure tracking)
//!
//! # Design Decisions
//! - A `Cluster` is one logical fabric; cloning a handle is a node joining it
//! - `local_map()` returns per-node state, `replicated_map()` the shared one
//! - Map values are JSON bytes; typed access via serde at the call site
//! - No consensus: the map is last-writer-wins unless callers use `put_if`

pub mod bus;
pub mod counter;
pub mod lock;
pub mod map;

pub use bus::{BusError, BusMessage, MessageBus};
pub use counter::Counters;
pub use lock::{LockError, LockGuard, LockRegistry};
pub use map::{MapError, SharedMap, Versioned};

/// Handle onto one logical cluster. Clones share the same fabric.
#[derive(Clone, Default)]
pub struct Cluster {
    bus: MessageBus,
    replicated: SharedMap,
    locks: LockRegistry,
    counters: Counters,
}

impl Cluster {
    /// Create a fresh fabric. Every handle cloned from this one sees the
    /// same bus, replicated map, locks and counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// The map shared by every node in the cluster.
    pub fn replicated_map(&self) -> SharedMap {
        self.replicated.clone()
    }

    /// A map visible only to the caller's node.
    pub fn local_map(&self) -> SharedMap {
        SharedMap::default()
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}
