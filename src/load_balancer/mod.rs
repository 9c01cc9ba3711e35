//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyRequest
//!     → dispatch.rs (retry loop)
//!     → router.rs (sticky → sticky domain → local → local domain → any)
//!         → affinity.rs (session id from path parameter or cookie)
//!         → selection.rs (one locked pass over the registry)
//!     → transport (forward)
//!     → success: clear error record / failure: quarantine, maybe retry
//! ```
//!
//! # Design Decisions
//! - One lock per load balancer guards every backend's load/error record
//! - No I/O while the lock is held
//! - Locals are ordered first at build time, so locality is a sub-range
//! - Quarantine is time based: a failed backend gets one trial request after
//!   `recover_time` seconds

mod affinity;
mod backend;
mod balancer;
pub mod clock;
mod dispatch;
mod registry;
mod router;
mod selection;

#[cfg(test)]
mod test_support;

pub use affinity::{SESSION_COOKIE, SESSION_PATH_PARAM};
pub use backend::{BackendStatus, DEFAULT_DOMAIN, MAX_WEIGHT};
pub use balancer::LoadBalancer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::DispatchError;
pub use registry::BuildError;
