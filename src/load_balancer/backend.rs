//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single balanced backend and its transport
//! - Hold the mutable load/error record used by selection
//!
//! # Design Decisions
//! - Identity (name, domain, weight, locality) is immutable after build
//! - The mutable record lives in the registry's lock, never next to the backend,
//!   so a selection pass sees every record in one consistent state

use serde::Serialize;

/// Domain assigned to backends that do not name one.
pub const DEFAULT_DOMAIN: &str = "unknown";

/// Largest usable weight. Larger factors are clamped so load counters stay
/// far from overflow.
pub const MAX_WEIGHT: i64 = 1_000_000;

/// A single balanced backend.
#[derive(Debug)]
pub struct Backend<T> {
    /// Unique name, matched against the route suffix of session ids.
    pub name: String,
    /// Group of backends that can stand in for each other.
    pub domain: String,
    /// Static weight, in `1..=MAX_WEIGHT`.
    pub weight: i64,
    /// Preferred over remote backends.
    pub is_local: bool,
    /// Local, or shares a domain with a local backend.
    pub is_local_domain: bool,
    pub(crate) transport: T,
}

impl<T> Backend<T> {
    pub(crate) fn new(name: String, domain: String, weight: i64, is_local: bool, transport: T) -> Self {
        Self {
            name,
            domain,
            weight: weight.clamp(1, MAX_WEIGHT),
            is_local,
            is_local_domain: is_local,
            transport,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// Mutable selection state of one backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LoadState {
    /// Weighted round-robin scratch counter.
    pub load: i64,
    pub in_error: bool,
    /// A single trial request is in flight after quarantine elapsed.
    pub recovering: bool,
    /// Seconds since epoch of the last failure or trial start, 0 if never.
    pub error_time: u64,
}

impl LoadState {
    pub fn new(weight: i64) -> Self {
        Self {
            load: weight,
            ..Self::default()
        }
    }

    pub fn mark_success(&mut self) {
        self.in_error = false;
        self.recovering = false;
        self.error_time = 0;
    }

    /// Start (or restart) a full quarantine.
    pub fn mark_failure(&mut self, now: u64) {
        self.in_error = true;
        self.recovering = false;
        self.error_time = now;
    }

    /// Grant the one trial request after quarantine.
    pub fn start_recovery(&mut self, now: u64) {
        self.recovering = true;
        self.error_time = now;
    }

    /// Still inside the recovery window.
    pub fn is_quarantined(&self, now: u64, recover_wait: u64) -> bool {
        self.in_error && now.saturating_sub(self.error_time) <= recover_wait
    }
}

/// Point-in-time view of a backend, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub domain: String,
    pub weight: i64,
    pub is_local: bool,
    pub is_local_domain: bool,
    pub load: i64,
    pub in_error: bool,
    pub recovering: bool,
    pub error_time: u64,
}

impl BackendStatus {
    pub(crate) fn new<T>(backend: &Backend<T>, state: &LoadState) -> Self {
        Self {
            name: backend.name.clone(),
            domain: backend.domain.clone(),
            weight: backend.weight,
            is_local: backend.is_local,
            is_local_domain: backend.is_local_domain,
            load: state.load,
            in_error: state.in_error,
            recovering: state.recovering,
            error_time: state.error_time,
        }
    }
}
