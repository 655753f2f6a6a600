//! Entry-point router.
//!
//! # Data Flow
//! ```text
//! register event ──▶ routes.rs (bind operation urls in the matcher)
//! unregister event ──▶ routes.rs (retract them)
//!
//! HTTP request ──▶ server.rs (catch-all dispatch)
//!     ──▶ matcher lookup ──▶ bus request to the operation url
//!     ──▶ reply converted to HTTP response (content negotiation)
//!
//! WS upgrade ──▶ websocket.rs
//!     ──▶ endpoint registered ──▶ frames pumped to the operation url,
//!         handler-id bus addresses pumped back to the socket
//! ```
//!
//! # Design Decisions
//! - Routing state changes only through registry events
//! - The gateway never retries; timeouts become error responses
//! - One catch-all axum route: the dynamic matcher owns dispatch

pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{AppState, GatewayServer};
