//! HTTP backend transport.
//!
//! # Responsibilities
//! - Represent a single HTTP backend server
//! - Enforce the per-backend connection limit
//! - Forward buffered requests and classify failures as recoverable or not
//! - Buffer responses up to a limit, stream larger ones through

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, BodyDataStream, Bytes};
use futures_util::{stream, StreamExt};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::{BackendConfig, TimeoutConfig};
use crate::transport::{BackendTransport, Forwarded, ProxyRequest, TransportError, TransportFactory};

/// Builds an `HttpTransport` per backend, all sharing one pooled client.
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    client: Client<HttpConnector, Body>,
    request_timeout: Duration,
    max_response_size: usize,
}

impl HttpTransportFactory {
    pub fn new(timeouts: &TimeoutConfig, max_response_size: usize) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            request_timeout: Duration::from_secs(timeouts.request_secs),
            max_response_size,
        }
    }
}

impl TransportFactory for HttpTransportFactory {
    type Transport = HttpTransport;

    fn create(&self, backend: &BackendConfig) -> Result<HttpTransport, TransportError> {
        let invalid = || TransportError::InvalidAddress {
            backend: backend.name.clone(),
            address: backend.address.clone(),
        };
        let addr: SocketAddr = backend.address.parse().map_err(|_| invalid())?;
        let authority = Authority::from_str(&addr.to_string()).map_err(|_| invalid())?;

        Ok(HttpTransport {
            name: backend.name.clone(),
            addr,
            authority,
            client: self.client.clone(),
            max_connections: backend.max_connections,
            active_connections: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
            request_timeout: self.request_timeout,
            max_response_size: self.max_response_size,
        })
    }
}

/// Transport for one HTTP backend.
#[derive(Debug)]
pub struct HttpTransport {
    name: String,
    addr: SocketAddr,
    authority: Authority,
    client: Client<HttpConnector, Body>,
    max_connections: usize,
    active_connections: Arc<AtomicUsize>,
    closed: AtomicBool,
    request_timeout: Duration,
    max_response_size: usize,
}

impl HttpTransport {
    /// Address of the backend.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of exchanges currently in flight.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    fn target_uri(&self, uri: &Uri) -> Option<Uri> {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts).ok()
    }
}

/// A slot in the backend's connection budget, returned on drop.
#[derive(Debug)]
pub struct HttpConnection {
    active: Arc<AtomicUsize>,
}

impl Drop for HttpConnection {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl BackendTransport for HttpTransport {
    type Connection = HttpConnection;
    type Response = Response<Body>;

    async fn acquire(&self) -> Result<HttpConnection, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed(self.name.clone()));
        }

        let mut prev = self.active_connections.load(Ordering::Relaxed);
        loop {
            if prev >= self.max_connections {
                return Err(TransportError::Busy(self.name.clone()));
            }
            match self.active_connections.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }

        Ok(HttpConnection {
            active: self.active_connections.clone(),
        })
    }

    async fn forward(
        &self,
        _connection: &mut HttpConnection,
        request: &ProxyRequest,
    ) -> Forwarded<Response<Body>> {
        let Some(uri) = self.target_uri(&request.uri) else {
            tracing::warn!(backend = %self.name, uri = %request.uri, "Cannot rewrite request URI for backend");
            return Forwarded::Failed { recoverable: true };
        };

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in request.headers.iter() {
                headers.append(name.clone(), value.clone());
            }
        }
        let outbound = match builder.body(Body::from(request.body.clone())) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(backend = %self.name, error = %e, "Failed to build backend request");
                return Forwarded::Failed { recoverable: true };
            }
        };

        // Nothing has been emitted until the response head arrives.
        let response = match tokio::time::timeout(self.request_timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(backend = %self.name, addr = %self.addr, error = %e, "Backend request failed");
                return Forwarded::Failed { recoverable: true };
            }
            Err(_) => {
                tracing::warn!(backend = %self.name, addr = %self.addr, "Backend timed out before responding");
                return Forwarded::Failed { recoverable: true };
            }
        };

        let (parts, body) = response.into_parts();
        let collected = tokio::time::timeout(
            self.request_timeout,
            buffer_body(Body::new(body).into_data_stream(), self.max_response_size),
        )
        .await;

        match collected {
            Ok(Buffered::Complete(chunks)) => {
                Forwarded::Success(Response::from_parts(parts, Body::from(chunks.concat())))
            }
            Ok(Buffered::Overflow(chunks, rest)) => {
                tracing::debug!(
                    backend = %self.name,
                    limit = self.max_response_size,
                    "Response exceeds buffer limit, streaming the rest"
                );
                let head = stream::iter(chunks.into_iter().map(Ok::<Bytes, axum::Error>));
                Forwarded::Success(Response::from_parts(parts, Body::from_stream(head.chain(rest))))
            }
            Ok(Buffered::Broken(e)) => {
                tracing::error!(backend = %self.name, status = %parts.status, error = %e, "Backend failed while sending its response");
                Forwarded::Failed { recoverable: false }
            }
            Err(_) => {
                tracing::error!(backend = %self.name, status = %parts.status, "Backend stalled while sending its response");
                Forwarded::Failed { recoverable: false }
            }
        }
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        tracing::debug!(backend = %self.name, addr = %self.addr, "HTTP transport shut down");
    }
}

enum Buffered {
    Complete(Vec<Bytes>),
    /// Limit crossed: the chunks read so far and the unread remainder.
    Overflow(Vec<Bytes>, BodyDataStream),
    Broken(axum::Error),
}

async fn buffer_body(mut body: BodyDataStream, limit: usize) -> Buffered {
    let mut chunks = Vec::new();
    let mut size = 0usize;
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => {
                size = size.saturating_add(chunk.len());
                chunks.push(chunk);
                if size > limit {
                    return Buffered::Overflow(chunks, body);
                }
            }
            Err(e) => return Buffered::Broken(e),
        }
    }
    Buffered::Complete(chunks)
}
