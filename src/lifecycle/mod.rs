//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting → in-flight requests drain
//!             → every load balancer shuts its backends down once
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
