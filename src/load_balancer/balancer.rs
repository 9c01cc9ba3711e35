//! Public load balancer handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{BackendConfig, BalancerConfig};
use crate::load_balancer::backend::BackendStatus;
use crate::load_balancer::clock::{Clock, SystemClock};
use crate::load_balancer::registry::{BuildError, Registry};
use crate::transport::{BackendTransport, TransportFactory};

/// A named load balancer over a fixed set of backends.
///
/// Built once from configuration, shared by all requests, shut down once
/// after traffic has drained.
#[derive(Debug)]
pub struct LoadBalancer<T> {
    pub(crate) registry: Registry<T>,
    retries: u32,
    closed: AtomicBool,
}

impl<T: BackendTransport> LoadBalancer<T> {
    /// Build using the system clock.
    pub fn build<F>(
        settings: &BalancerConfig,
        backends: &[BackendConfig],
        factory: &F,
    ) -> Result<Self, BuildError>
    where
        F: TransportFactory<Transport = T>,
    {
        Self::build_with_clock(settings, backends, factory, Arc::new(SystemClock))
    }

    /// Build with an explicit time source.
    pub fn build_with_clock<F>(
        settings: &BalancerConfig,
        backends: &[BackendConfig],
        factory: &F,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BuildError>
    where
        F: TransportFactory<Transport = T>,
    {
        let registry = Registry::build(settings, backends, factory, clock)?;
        Ok(Self {
            registry,
            retries: settings.retries,
            closed: AtomicBool::new(false),
        })
    }

    /// Shut down every backend transport. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(balancer = %self.registry.name, backends = self.registry.len(), "Shutting down load balancer");
        self.registry.close();
    }
}

impl<T> LoadBalancer<T> {
    pub fn name(&self) -> &str {
        &self.registry.name
    }

    /// Retry budget for callers; dispatch itself retries until no backend is left.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn sticky_session(&self) -> bool {
        self.registry.sticky_session
    }

    pub fn local_only(&self) -> bool {
        self.registry.local_only
    }

    /// Seconds a failed backend is kept out of rotation.
    pub fn recover_wait(&self) -> u64 {
        self.registry.recover_wait
    }

    pub fn local_count(&self) -> usize {
        self.registry.local_count
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.backends.is_empty()
    }

    /// Backends in selection order (locals first) with their current state.
    pub fn snapshot(&self) -> Vec<BackendStatus> {
        self.registry.snapshot()
    }
}
