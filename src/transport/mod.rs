//! Backend transport subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch loop picks a backend
//!     → BackendTransport::acquire (connection handle)
//!     → BackendTransport::forward (send buffered request, read response)
//!     → Forwarded::Success | Forwarded::Failed { recoverable }
//!     → BackendTransport::release
//! ```
//!
//! # Design Decisions
//! - The load balancer never speaks the wire protocol; it only sees this trait
//! - One transport per backend, created by a `TransportFactory` at build time
//! - "Recoverable" means nothing has reached the client yet, so the same
//!   buffered request may be replayed on another backend

pub mod http;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use thiserror::Error;

use crate::config::BackendConfig;

/// Errors raised by a backend transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured backend address could not be used.
    #[error("invalid address {address} for backend {backend}")]
    InvalidAddress { backend: String, address: String },

    /// The backend reached its connection limit.
    #[error("backend {0} reached its connection limit")]
    Busy(String),

    /// The transport was shut down.
    #[error("transport for backend {0} is shut down")]
    Closed(String),
}

/// Result of forwarding one request to one backend.
#[derive(Debug)]
pub enum Forwarded<R> {
    /// The backend produced a response.
    Success(R),
    /// The attempt failed. `recoverable` is true when nothing was emitted
    /// towards the client, so the request may be replayed elsewhere.
    Failed { recoverable: bool },
}

/// A request as seen by the load balancer.
///
/// The body is fully buffered so every retry replays identical bytes.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Name of the backend the request was last routed to.
    pub route: Option<String>,
}

impl ProxyRequest {
    /// Create a request without headers or body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            route: None,
        }
    }

    /// Build from the head of an inbound request and its buffered body.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            route: None,
        }
    }

    /// Append a header; invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Replace the buffered body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Client capability for a single backend.
#[async_trait]
pub trait BackendTransport: Send + Sync + std::fmt::Debug + 'static {
    /// Handle for one in-flight exchange.
    type Connection: Send;
    /// What a successful exchange yields to the caller.
    type Response: Send;

    /// Obtain a connection handle.
    async fn acquire(&self) -> Result<Self::Connection, TransportError>;

    /// Forward the request through the connection.
    async fn forward(
        &self,
        connection: &mut Self::Connection,
        request: &ProxyRequest,
    ) -> Forwarded<Self::Response>;

    /// Return the connection handle.
    fn release(&self, connection: Self::Connection) {
        drop(connection);
    }

    /// Tear the transport down. Called once, after traffic has drained.
    fn shutdown(&self);
}

/// Creates one transport per configured backend.
pub trait TransportFactory {
    type Transport: BackendTransport;

    fn create(&self, backend: &BackendConfig) -> Result<Self::Transport, TransportError>;
}
