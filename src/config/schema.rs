//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::load_balancer::DEFAULT_DOMAIN;

/// Lower bound for `recover_time`, in seconds.
pub const MIN_RECOVER_TIME_SECS: u64 = 60;

/// Default retry count handed to callers of a load balancer.
pub const DEFAULT_RETRIES: u32 = 3;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeouts for backend traffic.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Backend server definitions, shared by all load balancers.
    pub backends: Vec<BackendConfig>,

    /// Load balancer definitions.
    pub balancers: Vec<BalancerConfig>,

    /// Mounts mapping requests to load balancers.
    pub routes: Vec<RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request or response body buffered for replay, in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Timeout configuration for backend traffic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for one backend to answer, in seconds.
    pub request_secs: u64,

    /// Upper bound on a whole client request, failover included, in seconds.
    /// Must exceed `request_secs`.
    pub total_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            total_secs: 120,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter, overridden by `RUST_LOG`.
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// One backend application server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Unique backend identifier. This is the route suffix carried in
    /// session ids (`<id>.<name>`).
    pub name: String,

    /// Backend address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Relative weight. Values below 1 are treated as 1.
    pub lb_factor: i64,

    /// Domain (group of mutually substitutable backends).
    pub domain: String,

    /// Backend is reachable without crossing a costlier network boundary.
    pub local: bool,

    /// Maximum concurrent exchanges with this backend.
    pub max_connections: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            lb_factor: 1,
            domain: DEFAULT_DOMAIN.to_string(),
            local: false,
            max_connections: 100,
        }
    }
}

/// A named load balancer over an ordered list of backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Load balancer name, referenced by routes.
    pub name: String,

    /// Backend names, in preference order.
    pub members: Vec<String>,

    /// Route requests carrying a session id back to the same backend.
    pub sticky_session: bool,

    /// Never fall back from local backends to remote ones.
    pub local_worker_only: bool,

    /// Seconds a failed backend stays out of rotation (minimum 60).
    pub recover_time: u64,

    /// Retry budget exposed to callers; not used by dispatch itself.
    pub retries: u32,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            members: Vec::new(),
            sticky_session: true,
            local_worker_only: false,
            recover_time: MIN_RECOVER_TIME_SECS,
            retries: DEFAULT_RETRIES,
        }
    }
}

/// Mount mapping requests to a load balancer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Load balancer to dispatch to.
    pub balancer: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}
