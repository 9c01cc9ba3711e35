//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (members and routes reference existing names)
//! - Validate value ranges (timeouts > 0, total above per-backend, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("backend #{0} has no name")]
    UnnamedBackend(usize),

    #[error("backend {0} is defined more than once")]
    DuplicateBackend(String),

    #[error("backend {name} has invalid address {address}")]
    InvalidAddress { name: String, address: String },

    #[error("load balancer #{0} has no name")]
    UnnamedBalancer(usize),

    #[error("load balancer {0} is defined more than once")]
    DuplicateBalancer(String),

    #[error("load balancer {0} has no members")]
    EmptyBalancer(String),

    #[error("load balancer {balancer} lists {member} more than once")]
    DuplicateMember { balancer: String, member: String },

    #[error("load balancer {balancer} references unknown backend {member}")]
    UnknownMember { balancer: String, member: String },

    #[error("route {route} references unknown load balancer {balancer}")]
    UnknownBalancer { route: String, balancer: String },

    #[error("timeout {0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("total_secs ({total}) must be greater than request_secs ({request})")]
    TotalTimeoutTooShort { total: u64, request: u64 },
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut backends = HashSet::new();
    for (i, backend) in config.backends.iter().enumerate() {
        if backend.name.is_empty() {
            errors.push(ValidationError::UnnamedBackend(i));
            continue;
        }
        if !backends.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }
        if backend.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                name: backend.name.clone(),
                address: backend.address.clone(),
            });
        }
    }

    let mut balancers = HashSet::new();
    for (i, balancer) in config.balancers.iter().enumerate() {
        if balancer.name.is_empty() {
            errors.push(ValidationError::UnnamedBalancer(i));
            continue;
        }
        if !balancers.insert(balancer.name.as_str()) {
            errors.push(ValidationError::DuplicateBalancer(balancer.name.clone()));
        }
        if balancer.members.is_empty() {
            errors.push(ValidationError::EmptyBalancer(balancer.name.clone()));
        }

        let mut seen = HashSet::new();
        for member in &balancer.members {
            if !seen.insert(member.as_str()) {
                errors.push(ValidationError::DuplicateMember {
                    balancer: balancer.name.clone(),
                    member: member.clone(),
                });
            }
            if !backends.contains(member.as_str()) {
                errors.push(ValidationError::UnknownMember {
                    balancer: balancer.name.clone(),
                    member: member.clone(),
                });
            }
        }
    }

    for route in &config.routes {
        if !balancers.contains(route.balancer.as_str()) {
            errors.push(ValidationError::UnknownBalancer {
                route: route.name.clone(),
                balancer: route.balancer.clone(),
            });
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }
    if config.timeouts.total_secs <= config.timeouts.request_secs {
        errors.push(ValidationError::TotalTimeoutTooShort {
            total: config.timeouts.total_secs,
            request: config.timeouts.request_secs,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
