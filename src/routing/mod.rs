//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Operation url ("/orders/:id")
//!     → pattern.rs (compile `:name` tokens into named capture groups)
//!     → matcher.rs (append to the method's binding list)
//!
//! Incoming request (method, path)
//!     → matcher.rs (scan bindings in registration order, first match wins)
//!     → handler(params attached) or fallback (404)
//! ```
//!
//! # Design Decisions
//! - First match, not best match; registration order is the tie-breaker
//! - Duplicate `:name` tokens are a configuration error at bind time
//! - Bindings mutate only behind the gateway's single writer lock

pub mod matcher;
pub mod pattern;

pub use matcher::{RouteHandler, RouteMatcher, RouteRequest};
pub use pattern::{CompiledPattern, PatternError};
