//! Mount matching logic.
//!
//! Host matching is case-insensitive and ignores the port; path matching is
//! case-sensitive. A mount with no conditions matches everything.

use axum::http::header::HOST;
use axum::http::request::Parts;

/// A single mount condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Host header, stored lowercase.
    Host(String),
    PathPrefix(String),
}

impl Matcher {
    pub fn host(host: impl Into<String>) -> Self {
        Matcher::Host(host.into().to_lowercase())
    }

    pub fn path_prefix(prefix: impl Into<String>) -> Self {
        Matcher::PathPrefix(prefix.into())
    }

    pub fn matches(&self, parts: &Parts) -> bool {
        match self {
            Matcher::Host(expected) => request_host(parts)
                .map(|host| host.eq_ignore_ascii_case(expected))
                .unwrap_or(false),
            Matcher::PathPrefix(prefix) => parts.uri.path().starts_with(prefix.as_str()),
        }
    }
}

/// Host from the header, falling back to the absolute URI, without the port.
fn request_host(parts: &Parts) -> Option<&str> {
    let host = parts
        .headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| parts.uri.host())?;
    Some(match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    })
}
