//! Service discovery façade.
//!
//! Read-only queries against the registry over the bus. No caching: every
//! call reflects the directory at query time.

pub mod client;

pub use client::{DiscoveryClient, DiscoveryError};
