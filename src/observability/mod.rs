//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! load_balancer, http
//!     → logging.rs (tracing events, filtered by EnvFilter)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all log lines of a request
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
