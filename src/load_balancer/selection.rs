//! Candidate selection.
//!
//! One pass over a sub-range of the registry, under the registry lock:
//! filter by criterion, skip quarantined backends, then pick either the first
//! eligible backend or the weighted winner.
//!
//! Backends excluded by the caller (busy for the current request) are treated
//! like ineligible ones, without touching their records.
//!
//! Weighted passes add each eligible backend's weight to its load counter and
//! pick the largest counter (earliest wins ties). The winner then pays back
//! the total weight of the pass, which yields weighted round-robin over time.

use std::ops::Range;

use crate::load_balancer::backend::Backend;
use crate::load_balancer::registry::Registry;

/// What a backend must match to be a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Criterion<'a> {
    ByName(&'a str),
    ByDomain(&'a str),
    IsLocal,
    IsLocalDomain,
    Any,
}

impl Criterion<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Criterion::ByName(_) => "sticky",
            Criterion::ByDomain(_) => "sticky domain",
            Criterion::IsLocal => "local",
            Criterion::IsLocalDomain => "local domain",
            Criterion::Any => "any",
        }
    }

    fn value(&self) -> &str {
        match self {
            Criterion::ByName(v) | Criterion::ByDomain(v) => v,
            _ => "any",
        }
    }

    fn matches<T>(&self, backend: &Backend<T>) -> bool {
        match self {
            Criterion::ByName(name) => backend.name == *name,
            Criterion::ByDomain(domain) => backend.domain == *domain,
            Criterion::IsLocal => backend.is_local,
            Criterion::IsLocalDomain => backend.is_local_domain,
            Criterion::Any => true,
        }
    }
}

/// Outcome of one selection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Selection {
    /// Index of the chosen backend.
    pub selected: Option<usize>,
    /// Index of the backend matching a `ByName` search, eligible or not.
    pub name_match: Option<usize>,
}

impl<T> Registry<T> {
    pub fn select(
        &self,
        criterion: Criterion<'_>,
        range: Range<usize>,
        weighted: bool,
        excluded: &[usize],
    ) -> Selection {
        let mut result = Selection::default();

        let mut states = match self.states.lock() {
            Ok(states) => states,
            Err(_) => {
                tracing::error!(balancer = %self.name, "could not lock load balancer");
                return result;
            }
        };
        let now = self.clock.now();
        let range = range.start.min(self.backends.len())..range.end.min(self.backends.len());

        tracing::debug!(
            balancer = %self.name,
            search = criterion.label(),
            value = criterion.value(),
            "Searching for backend"
        );

        let mut max_load = 0;
        let mut total_weight: i64 = 0;

        for i in range {
            let backend = &self.backends[i];
            if !criterion.matches(backend) {
                continue;
            }
            if let Criterion::ByName(_) = criterion {
                result.name_match = Some(i);
            }

            if excluded.contains(&i) {
                tracing::trace!(backend = %backend.name, "Candidate is busy for this request");
                continue;
            }

            let state = &mut states[i];
            if state.in_error && state.recovering {
                tracing::trace!(backend = %backend.name, "Candidate is already recovering");
                continue;
            }
            if state.is_quarantined(now, self.recover_wait) {
                tracing::debug!(
                    backend = %backend.name,
                    elapsed = now.saturating_sub(state.error_time),
                    recover_wait = self.recover_wait,
                    "Candidate is in error state, will not yet recover"
                );
                continue;
            }

            if !weighted {
                result.selected = Some(i);
                break;
            }

            state.load = state.load.saturating_add(backend.weight);
            total_weight = total_weight.saturating_add(backend.weight);
            if result.selected.is_none() || state.load > max_load {
                max_load = state.load;
                result.selected = Some(i);
            }
        }

        if let Some(i) = result.selected {
            let backend = &self.backends[i];
            let state = &mut states[i];
            if state.in_error {
                state.start_recovery(now);
                tracing::debug!(backend = %backend.name, "Backend is in error state, will recover");
            }
            state.load = state.load.saturating_sub(total_weight);
            tracing::debug!(
                balancer = %self.name,
                backend = %backend.name,
                load = state.load,
                search = criterion.label(),
                "Found backend"
            );
        } else {
            tracing::debug!(
                balancer = %self.name,
                search = criterion.label(),
                value = criterion.value(),
                "Found no backend"
            );
        }

        result
    }
}
