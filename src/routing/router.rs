//! Mount lookup.

use axum::http::request::Parts;

use crate::config::RouteConfig;
use crate::routing::Matcher;

/// A compiled mount: all matchers must pass.
#[derive(Debug, Clone)]
pub struct Mount {
    pub name: String,
    pub balancer: String,
    pub priority: u32,
    matchers: Vec<Matcher>,
}

impl Mount {
    pub fn from_config(config: RouteConfig) -> Self {
        let mut matchers = Vec::new();
        if let Some(host) = config.host {
            matchers.push(Matcher::host(host));
        }
        if let Some(prefix) = config.path_prefix {
            matchers.push(Matcher::path_prefix(prefix));
        }
        Self {
            name: config.name,
            balancer: config.balancer,
            priority: config.priority,
            matchers,
        }
    }

    pub fn matches(&self, parts: &Parts) -> bool {
        self.matchers.iter().all(|m| m.matches(parts))
    }
}

/// Immutable, priority-ordered mounts.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    pub fn from_config(routes: Vec<RouteConfig>) -> Self {
        let mut mounts: Vec<Mount> = routes.into_iter().map(Mount::from_config).collect();
        // Stable sort, so equal priorities keep configuration order.
        mounts.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { mounts }
    }

    pub fn resolve(&self, parts: &Parts) -> Option<&Mount> {
        self.mounts.iter().find(|m| m.matches(parts))
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}
