//! Backend registry.
//!
//! # Responsibilities
//! - Build every member backend and its transport, all or nothing
//! - Order local backends first and derive local-domain membership
//! - Own the single lock guarding all load/error records
//! - Tear transports down once

use std::collections::HashSet;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::config::{BackendConfig, BalancerConfig};
use crate::config::schema::MIN_RECOVER_TIME_SECS;
use crate::load_balancer::backend::{Backend, BackendStatus, LoadState};
use crate::load_balancer::clock::Clock;
use crate::transport::{BackendTransport, TransportError, TransportFactory};

/// Failure to build a load balancer.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("load balancer {0} has no members")]
    NoMembers(String),

    #[error("load balancer {balancer} references unknown backend {backend}")]
    UnknownBackend { balancer: String, backend: String },

    #[error("load balancer {balancer} lists backend {backend} more than once")]
    DuplicateBackend { balancer: String, backend: String },

    #[error("load balancer {0} is defined more than once")]
    DuplicateBalancer(String),

    #[error("failed to create transport for backend {backend}: {source}")]
    Transport {
        backend: String,
        #[source]
        source: TransportError,
    },
}

/// Ordered backends of one load balancer plus their shared state.
#[derive(Debug)]
pub(crate) struct Registry<T> {
    pub name: String,
    /// Local backends occupy `[0, local_count)`.
    pub backends: Vec<Backend<T>>,
    pub local_count: usize,
    pub sticky_session: bool,
    pub local_only: bool,
    /// Seconds, never below the minimum.
    pub recover_wait: u64,
    pub states: Mutex<Vec<LoadState>>,
    pub clock: Arc<dyn Clock>,
}

impl<T: BackendTransport> Registry<T> {
    /// Build from configuration. On any failure every transport created so far
    /// is shut down before the error is returned.
    pub fn build<F>(
        settings: &BalancerConfig,
        definitions: &[BackendConfig],
        factory: &F,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BuildError>
    where
        F: TransportFactory<Transport = T>,
    {
        if settings.members.is_empty() {
            return Err(BuildError::NoMembers(settings.name.clone()));
        }

        let mut built: Vec<Backend<T>> = Vec::with_capacity(settings.members.len());
        let mut seen = HashSet::new();

        for member in &settings.members {
            let result = if !seen.insert(member.as_str()) {
                Err(BuildError::DuplicateBackend {
                    balancer: settings.name.clone(),
                    backend: member.clone(),
                })
            } else {
                Self::build_backend(settings, definitions, member, factory)
            };

            match result {
                Ok(backend) => built.push(backend),
                Err(e) => {
                    tracing::error!(balancer = %settings.name, backend = %member, error = %e, "Failed to build backend");
                    close_backends(&built);
                    return Err(e);
                }
            }
        }

        // Stable partition: locals first, relative order kept in each group.
        let (mut backends, remote): (Vec<_>, Vec<_>) = built.into_iter().partition(|b| b.is_local);
        let local_count = backends.len();
        backends.extend(remote);

        let local_domains: HashSet<String> = backends[..local_count]
            .iter()
            .map(|b| b.domain.clone())
            .collect();
        for backend in &mut backends[local_count..] {
            backend.is_local_domain = local_domains.contains(&backend.domain);
        }

        let local_only = settings.local_worker_only && local_count > 0;
        let recover_wait = settings.recover_time.max(MIN_RECOVER_TIME_SECS);
        let states = backends.iter().map(|b| LoadState::new(b.weight)).collect();

        for (i, backend) in backends.iter().enumerate() {
            tracing::info!(
                balancer = %settings.name,
                index = i,
                backend = %backend.name,
                domain = %backend.domain,
                weight = backend.weight,
                local = backend.is_local,
                local_domain = backend.is_local_domain,
                "Balanced backend"
            );
        }
        tracing::debug!(
            balancer = %settings.name,
            local_count,
            sticky_session = settings.sticky_session,
            local_only,
            recover_wait,
            "Load balancer built"
        );

        Ok(Self {
            name: settings.name.clone(),
            backends,
            local_count,
            sticky_session: settings.sticky_session,
            local_only,
            recover_wait,
            states: Mutex::new(states),
            clock,
        })
    }

    fn build_backend<F>(
        settings: &BalancerConfig,
        definitions: &[BackendConfig],
        member: &str,
        factory: &F,
    ) -> Result<Backend<T>, BuildError>
    where
        F: TransportFactory<Transport = T>,
    {
        let definition = definitions
            .iter()
            .find(|d| d.name == member)
            .ok_or_else(|| BuildError::UnknownBackend {
                balancer: settings.name.clone(),
                backend: member.to_string(),
            })?;

        let transport = factory.create(definition).map_err(|source| BuildError::Transport {
            backend: member.to_string(),
            source,
        })?;

        let domain = if definition.domain.is_empty() {
            crate::load_balancer::DEFAULT_DOMAIN.to_string()
        } else {
            definition.domain.clone()
        };

        Ok(Backend::new(
            definition.name.clone(),
            domain,
            definition.lb_factor,
            definition.local,
            transport,
        ))
    }

    /// Shut down every backend transport.
    pub fn close(&self) {
        close_backends(&self.backends);
    }
}

impl<T> Registry<T> {
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn local_range(&self) -> Range<usize> {
        0..self.local_count
    }

    pub fn remote_range(&self) -> Range<usize> {
        self.local_count..self.backends.len()
    }

    /// Clear the error record after a successful exchange.
    pub fn mark_success(&self, index: usize) {
        match self.states.lock() {
            Ok(mut states) => states[index].mark_success(),
            Err(_) => tracing::error!(balancer = %self.name, "could not lock load balancer"),
        }
    }

    /// Put the backend into a fresh quarantine.
    pub fn mark_failure(&self, index: usize) {
        let now = self.clock.now();
        match self.states.lock() {
            Ok(mut states) => states[index].mark_failure(now),
            Err(_) => tracing::error!(balancer = %self.name, "could not lock load balancer"),
        }
    }

    /// Settle an attempt that ended without an outcome (cancelled, or the
    /// backend was busy). Only a pending recovery trial goes back into
    /// quarantine; any other record is left alone.
    pub fn abandon(&self, index: usize) {
        let now = self.clock.now();
        match self.states.lock() {
            Ok(mut states) => {
                let state = &mut states[index];
                if state.recovering {
                    state.mark_failure(now);
                }
            }
            Err(_) => tracing::error!(balancer = %self.name, "could not lock load balancer"),
        }
    }

    pub fn snapshot(&self) -> Vec<BackendStatus> {
        match self.states.lock() {
            Ok(states) => self
                .backends
                .iter()
                .zip(states.iter())
                .map(|(backend, state)| BackendStatus::new(backend, state))
                .collect(),
            Err(_) => {
                tracing::error!(balancer = %self.name, "could not lock load balancer");
                Vec::new()
            }
        }
    }
}

fn close_backends<T: BackendTransport>(backends: &[Backend<T>]) {
    for backend in backends {
        backend.transport.shutdown();
    }
}
