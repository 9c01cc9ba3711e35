//! Affinity-aware routing.
//!
//! # Search Order
//! ```text
//! for each `<id>.<backend>` part of the session id:
//!     sticky         → exact backend, first eligible
//!     sticky domain  → weighted within the backend's domain
//! local              → weighted over local backends
//! (stop here when local_worker_only)
//! local domain       → weighted over remote backends sharing a local domain
//! any                → weighted over remote backends
//! ```

use crate::load_balancer::affinity;
use crate::load_balancer::registry::Registry;
use crate::load_balancer::selection::Criterion;
use crate::load_balancer::DEFAULT_DOMAIN;
use crate::transport::ProxyRequest;

/// A routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Route {
    pub index: usize,
    pub search: &'static str,
}

impl<T> Registry<T> {
    /// Pick a backend for the request. `excluded` backends are passed over
    /// for this request only.
    pub fn route(&self, request: &ProxyRequest, excluded: &[usize]) -> Option<Route> {
        let session = if self.sticky_session {
            affinity::session_id(request)
        } else {
            None
        };

        if let Some(session) = session.as_deref() {
            tracing::debug!(balancer = %self.name, session = %session, "Routing with session id");
            if let Some(route) = self.route_sticky(session, excluded) {
                return Some(route);
            }
        }

        if self.local_count > 0 {
            if let Some(route) = self.weighted(Criterion::IsLocal, self.local_range(), excluded) {
                return Some(route);
            }
            if self.local_only {
                return None;
            }
            if let Some(route) = self.weighted(Criterion::IsLocalDomain, self.remote_range(), excluded) {
                return Some(route);
            }
        }

        self.weighted(Criterion::Any, self.remote_range(), excluded)
    }

    fn route_sticky(&self, session: &str, excluded: &[usize]) -> Option<Route> {
        for part in session.split(';') {
            let Some((_, name)) = part.rsplit_once('.') else {
                continue;
            };

            let sticky = Criterion::ByName(name);
            let selection = self.select(sticky, 0..self.len(), false, excluded);
            if let Some(index) = selection.selected {
                return Some(Route {
                    index,
                    search: sticky.label(),
                });
            }

            let domain = selection
                .name_match
                .map_or(DEFAULT_DOMAIN, |i| self.backends[i].domain.as_str());
            tracing::debug!(balancer = %self.name, domain = %domain, route = %name, "Falling back to session domain");

            if let Some(route) = self.weighted(Criterion::ByDomain(domain), 0..self.len(), excluded) {
                return Some(route);
            }
        }
        None
    }

    fn weighted(
        &self,
        criterion: Criterion<'_>,
        range: std::ops::Range<usize>,
        excluded: &[usize],
    ) -> Option<Route> {
        self.select(criterion, range, true, excluded).selected.map(|index| Route {
            index,
            search: criterion.label(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::{backend, balancer, registry};
    use axum::http::Method;

    fn request(uri: &str) -> ProxyRequest {
        ProxyRequest::new(Method::GET, uri.parse().unwrap())
    }

    fn routed<T>(registry: &Registry<T>, request: &ProxyRequest) -> Option<String> {
        registry
            .route(request, &[])
            .map(|r| registry.backends[r.index].name.clone())
    }

    #[test]
    fn test_sticky_exact_match_beats_load() {
        let (registry, _clock, _factory) = registry(
            &balancer(&["A", "B"]),
            &[backend("A", 1, "", false), backend("B", 100, "", false)],
        );
        let req = request("/app").with_header("cookie", "JSESSIONID=xyz123.A");

        for _ in 0..20 {
            let route = registry.route(&req, &[]).unwrap();
            assert_eq!(registry.backends[route.index].name, "A");
            assert_eq!(route.search, "sticky");
        }
    }

    #[test]
    fn test_sticky_domain_fallback() {
        let (registry, _clock, _factory) = registry(
            &balancer(&["A", "B", "C"]),
            &[
                backend("A", 1, "rack1", false),
                backend("B", 1, "rack1", false),
                backend("C", 10, "rack2", false),
            ],
        );
        registry.mark_failure(0);
        let req = request("/app;jsessionid=xyz123.A");

        for _ in 0..10 {
            let route = registry.route(&req, &[]).unwrap();
            assert_eq!(registry.backends[route.index].name, "B");
            assert_eq!(route.search, "sticky domain");
        }
    }

    #[test]
    fn test_unknown_route_falls_back_to_default_domain() {
        let (registry, _clock, _factory) = registry(
            &balancer(&["A", "B"]),
            &[backend("A", 1, "rack1", false), backend("B", 1, "", false)],
        );
        let req = request("/app;jsessionid=xyz123.gone");

        let route = registry.route(&req, &[]).unwrap();
        assert_eq!(registry.backends[route.index].name, "B");
        assert_eq!(route.search, "sticky domain");
    }

    #[test]
    fn test_session_parts_tried_in_order() {
        let (registry, _clock, _factory) = registry(
            &balancer(&["A", "B", "C"]),
            &[
                backend("A", 1, "rack1", false),
                backend("B", 1, "rack2", false),
                backend("C", 1, "rack3", false),
            ],
        );
        registry.mark_failure(0);
        let req = request("/app")
            .with_header("cookie", "JSESSIONID=old.A")
            .with_header("cookie", "JSESSIONID=new.C");

        assert_eq!(routed(&registry, &req).as_deref(), Some("C"));
    }

    #[test]
    fn test_route_suffix_after_last_dot() {
        let (registry, _clock, _factory) = registry(
            &balancer(&["A", "B"]),
            &[backend("A", 1, "", false), backend("B", 1, "", false)],
        );
        let req = request("/app;jsessionid=abc.def.B");
        assert_eq!(routed(&registry, &req).as_deref(), Some("B"));
    }

    #[test]
    fn test_session_ignored_when_not_sticky() {
        let mut settings = balancer(&["A", "B"]);
        settings.sticky_session = false;
        let (registry, _clock, _factory) = registry(
            &settings,
            &[backend("A", 1, "", false), backend("B", 3, "", false)],
        );
        let req = request("/app;jsessionid=xyz123.A");

        let picks: Vec<_> = (0..4).map(|_| routed(&registry, &req).unwrap()).collect();
        assert_eq!(picks.iter().filter(|n| *n == "B").count(), 3);
    }

    #[test]
    fn test_local_preferred_then_local_domain_then_any() {
        let (registry, _clock, _factory) = registry(
            &balancer(&["R", "D", "L"]),
            &[
                backend("R", 1, "far", false),
                backend("D", 1, "near", false),
                backend("L", 1, "near", true),
            ],
        );
        let req = request("/app");
        let names: Vec<_> = registry.backends.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["L", "R", "D"]);

        assert_eq!(routed(&registry, &req).as_deref(), Some("L"));

        registry.mark_failure(0); // L
        let route = registry.route(&req, &[]).unwrap();
        assert_eq!(registry.backends[route.index].name, "D");
        assert_eq!(route.search, "local domain");

        registry.mark_failure(2); // D
        let route = registry.route(&req, &[]).unwrap();
        assert_eq!(registry.backends[route.index].name, "R");
        assert_eq!(route.search, "any");

        registry.mark_failure(1); // R
        assert_eq!(registry.route(&req, &[]), None);
    }

    #[test]
    fn test_local_only_never_crosses_over() {
        let mut settings = balancer(&["R", "L"]);
        settings.local_worker_only = true;
        let (registry, _clock, _factory) = registry(
            &settings,
            &[backend("R", 1, "", false), backend("L", 1, "", true)],
        );
        let req = request("/app");

        assert_eq!(routed(&registry, &req).as_deref(), Some("L"));
        registry.mark_failure(0);
        assert_eq!(registry.route(&req, &[]), None);

        // A session naming the remote backend still reaches it.
        let req = request("/app;jsessionid=s.R");
        assert_eq!(routed(&registry, &req).as_deref(), Some("R"));
    }

    #[test]
    fn test_excluded_backend_is_passed_over_without_penalty() {
        let (registry, _clock, _factory) = registry(
            &balancer(&["A", "B", "C"]),
            &[
                backend("A", 1, "rack1", false),
                backend("B", 1, "rack1", false),
                backend("C", 9, "rack2", false),
            ],
        );
        let req = request("/app;jsessionid=s.A");

        let route = registry.route(&req, &[0]).unwrap();
        assert_eq!(registry.backends[route.index].name, "B");
        assert_eq!(route.search, "sticky domain");
        assert!(!registry.snapshot()[0].in_error);

        // Only this request was affected.
        assert_eq!(routed(&registry, &req).as_deref(), Some("A"));
    }

    #[test]
    fn test_all_remote_pool() {
        let (registry, _clock, _factory) = registry(
            &balancer(&["A", "B"]),
            &[backend("A", 1, "", false), backend("B", 1, "", false)],
        );
        let req = request("/app");

        let picks: Vec<_> = (0..4).map(|_| routed(&registry, &req).unwrap()).collect();
        assert_eq!(picks, ["A", "B", "A", "B"]);
    }
}
