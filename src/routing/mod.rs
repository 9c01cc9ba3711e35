//! Mount table: which load balancer serves a request.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (mounts in priority order)
//!     → matcher.rs (host / path prefix conditions)
//!     → Return: matched Mount or None (404)
//! ```
//!
//! # Design Decisions
//! - Mounts compiled at startup, immutable at runtime
//! - Prefix matching only
//! - First match wins; equal priorities keep configuration order

pub mod matcher;
pub mod router;

pub use matcher::Matcher;
pub use router::{Mount, MountTable};
