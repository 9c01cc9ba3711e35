//! Dispatch loop.
//!
//! # State Machine
//! ```text
//! SELECTING ──no backend──▶ FAILED_EXHAUSTED
//!     │
//!     ▼
//! ACQUIRING ──busy──▶ excluded for this request ──▶ SELECTING
//!     │
//!     ▼
//! FORWARDING ──success──▶ SUCCEEDED (error record cleared)
//!     │
//!     ├──failed, recoverable─────▶ quarantine ──▶ SELECTING
//!     └──failed, not recoverable─▶ quarantine ──▶ FAILED_FATAL
//! ```
//!
//! There is no attempt counter: every failed backend is quarantined and every
//! busy backend is excluded, so the eligible set shrinks until selection comes
//! back empty.

use thiserror::Error;

use crate::load_balancer::balancer::LoadBalancer;
use crate::load_balancer::registry::Registry;
use crate::observability::metrics;
use crate::transport::{BackendTransport, Forwarded, ProxyRequest, TransportError};

/// Terminal dispatch failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No eligible backend is left.
    #[error("load balancer {balancer}: all backends failed, no healthy backend available")]
    Exhausted { balancer: String },

    /// The backend failed after it started answering; the request cannot be
    /// replayed elsewhere.
    #[error("backend {backend} failed in the middle of the request, cannot recover to another backend")]
    Fatal { balancer: String, backend: String },
}

impl DispatchError {
    /// Metric/log label.
    pub fn outcome(&self) -> &'static str {
        match self {
            DispatchError::Exhausted { .. } => "exhausted",
            DispatchError::Fatal { .. } => "fatal",
        }
    }
}

/// Settles the error record of one attempt. Dropped unsettled (the dispatch
/// future was cancelled) only a pending recovery trial is re-quarantined.
struct Attempt<'a, T> {
    registry: &'a Registry<T>,
    index: usize,
    settled: bool,
}

impl<'a, T> Attempt<'a, T> {
    fn new(registry: &'a Registry<T>, index: usize) -> Self {
        Self {
            registry,
            index,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.registry.mark_success(self.index);
    }

    fn fail(mut self) {
        self.settled = true;
        self.registry.mark_failure(self.index);
    }

    fn abandon(mut self) {
        self.settled = true;
        self.registry.abandon(self.index);
    }
}

impl<T> Drop for Attempt<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(
                balancer = %self.registry.name,
                backend = %self.registry.backends[self.index].name,
                "Request cancelled while forwarding"
            );
            self.registry.abandon(self.index);
        }
    }
}

impl<T: BackendTransport> LoadBalancer<T> {
    /// Route the request and forward it, failing over between backends while
    /// failures stay recoverable.
    pub async fn dispatch(&self, request: &mut ProxyRequest) -> Result<T::Response, DispatchError> {
        let registry = &self.registry;
        let mut attempts = 0u32;
        let mut busy: Vec<usize> = Vec::new();

        tracing::debug!(balancer = %registry.name, sticky_session = registry.sticky_session, "Dispatching request");

        loop {
            let Some(route) = registry.route(request, &busy) else {
                tracing::error!(balancer = %registry.name, attempts, busy = busy.len(), "All backends failed, no more backends left");
                metrics::record_dispatch(&registry.name, "exhausted");
                return Err(DispatchError::Exhausted {
                    balancer: registry.name.clone(),
                });
            };
            attempts += 1;

            let backend = &registry.backends[route.index];
            request.route = Some(backend.name.clone());
            metrics::record_selection(&registry.name, &backend.name, route.search);
            tracing::debug!(
                balancer = %registry.name,
                backend = %backend.name,
                search = route.search,
                attempt = attempts,
                "Forwarding request"
            );

            let attempt = Attempt::new(registry, route.index);
            let outcome = match backend.transport.acquire().await {
                Ok(mut connection) => {
                    let outcome = backend.transport.forward(&mut connection, request).await;
                    backend.transport.release(connection);
                    outcome
                }
                Err(TransportError::Busy(_)) => {
                    tracing::debug!(balancer = %registry.name, backend = %backend.name, "Backend busy, trying another one");
                    attempt.abandon();
                    busy.push(route.index);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(balancer = %registry.name, backend = %backend.name, error = %e, "Failed to acquire connection");
                    Forwarded::Failed { recoverable: true }
                }
            };

            match outcome {
                Forwarded::Success(response) => {
                    attempt.succeed();
                    metrics::record_dispatch(&registry.name, "success");
                    return Ok(response);
                }
                Forwarded::Failed { recoverable } => {
                    attempt.fail();
                    metrics::record_backend_failure(&registry.name, &backend.name, recoverable);

                    if !recoverable {
                        tracing::error!(
                            balancer = %registry.name,
                            backend = %backend.name,
                            "Unrecoverable error, request failed: backend failed in the middle of the request"
                        );
                        metrics::record_dispatch(&registry.name, "fatal");
                        return Err(DispatchError::Fatal {
                            balancer: registry.name.clone(),
                            backend: backend.name.clone(),
                        });
                    }

                    tracing::warn!(
                        balancer = %registry.name,
                        backend = %backend.name,
                        attempt = attempts,
                        "Recoverable error, will try to recover on another backend"
                    );
                }
            }
        }
    }
}
