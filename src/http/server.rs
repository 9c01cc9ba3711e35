//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build one load balancer per configured balancer, all or nothing
//! - Create the Axum router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Map dispatch outcomes to status codes
//! - Shut every load balancer down once after the server has drained

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::request::{request_id, MakeRequestUuid, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{BuildError, DispatchError, LoadBalancer};
use crate::observability::metrics;
use crate::routing::MountTable;
use crate::transport::http::{HttpTransport, HttpTransportFactory};
use crate::transport::ProxyRequest;

/// Largest backend response body buffered for a client. Larger bodies are
/// streamed through without replay protection.
const MAX_RESPONSE_SIZE: usize = 64 * 1024 * 1024;

pub type Balancers = HashMap<String, LoadBalancer<HttpTransport>>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub mounts: Arc<MountTable>,
    pub balancers: Arc<Balancers>,
    pub max_body_size: usize,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    balancers: Arc<Balancers>,
}

impl HttpServer {
    /// Build every load balancer and the router. If one load balancer fails to
    /// build or its name is taken, the ones already built are shut down.
    pub fn new(config: ProxyConfig) -> Result<Self, BuildError> {
        let factory = HttpTransportFactory::new(&config.timeouts, MAX_RESPONSE_SIZE);

        let mut balancers = Balancers::new();
        for settings in &config.balancers {
            if balancers.contains_key(&settings.name) {
                tracing::error!(balancer = %settings.name, "Load balancer defined more than once");
                balancers.values().for_each(LoadBalancer::shutdown);
                return Err(BuildError::DuplicateBalancer(settings.name.clone()));
            }
            match LoadBalancer::build(settings, &config.backends, &factory) {
                Ok(lb) => {
                    balancers.insert(settings.name.clone(), lb);
                }
                Err(e) => {
                    tracing::error!(balancer = %settings.name, error = %e, "Failed to build load balancer");
                    balancers.values().for_each(LoadBalancer::shutdown);
                    return Err(e);
                }
            }
        }

        let state = AppState {
            mounts: Arc::new(MountTable::from_config(config.routes.clone())),
            balancers: Arc::new(balancers),
            max_body_size: config.listener.max_body_size,
        };
        let balancers = state.balancers.clone();
        let router = Self::build_router(&config, state);

        Ok(Self { router, balancers })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.total_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuid))
    }

    /// Load balancers by name.
    pub fn balancers(&self) -> Arc<Balancers> {
        self.balancers.clone()
    }

    /// Serve until `shutdown` fires, then drain and shut every load balancer
    /// down.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, balancers = self.balancers.len(), "HTTP server starting");

        let mut signal = shutdown.subscribe();
        let served = axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = signal.recv().await;
            })
            .await;

        for lb in self.balancers.values() {
            lb.shutdown();
        }
        tracing::info!("HTTP server stopped");
        served
    }
}

/// Main proxy handler.
/// Resolves the mount, buffers the body, and dispatches to the load balancer.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().to_string();
    let (parts, body) = request.into_parts();

    tracing::debug!(request_id = %request_id, method = %method, uri = %parts.uri, "Proxying request");

    let Some(mount) = state.mounts.resolve(&parts) else {
        tracing::warn!(request_id = %request_id, path = %parts.uri.path(), "No route matched");
        metrics::record_request(&method, 404, "none", start);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };

    let Some(lb) = state.balancers.get(&mount.balancer) else {
        tracing::error!(request_id = %request_id, route = %mount.name, balancer = %mount.balancer, "Route points at a missing load balancer");
        metrics::record_request(&method, 500, &mount.balancer, start);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Load balancer not configured").into_response();
    };

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, limit = state.max_body_size, error = %e, "Failed to buffer request body");
            metrics::record_request(&method, 413, lb.name(), start);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let mut proxied = ProxyRequest::from_parts(parts, body);
    match lb.dispatch(&mut proxied).await {
        Ok(response) => {
            tracing::debug!(
                request_id = %request_id,
                backend = proxied.route.as_deref().unwrap_or("none"),
                status = %response.status(),
                "Backend responded"
            );
            metrics::record_request(&method, response.status().as_u16(), lb.name(), start);
            response
        }
        Err(e) => {
            let status = match e {
                DispatchError::Exhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
                DispatchError::Fatal { .. } => StatusCode::BAD_GATEWAY,
            };
            tracing::warn!(request_id = %request_id, outcome = e.outcome(), error = %e, "Dispatch failed");
            metrics::record_request(&method, status.as_u16(), lb.name(), start);
            (status, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, BalancerConfig};

    fn config_with_balancers(names: &[&str]) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.backends.push(BackendConfig {
            name: "node1".into(),
            address: "127.0.0.1:1".into(),
            ..BackendConfig::default()
        });
        for name in names {
            config.balancers.push(BalancerConfig {
                name: name.to_string(),
                members: vec!["node1".into()],
                ..BalancerConfig::default()
            });
        }
        config
    }

    #[tokio::test]
    async fn test_duplicate_balancer_name_is_rejected() {
        let err = HttpServer::new(config_with_balancers(&["web", "api", "web"])).err();
        assert!(matches!(err, Some(BuildError::DuplicateBalancer(ref name)) if name == "web"));
    }

    #[tokio::test]
    async fn test_distinct_balancers_are_all_built() {
        let server = HttpServer::new(config_with_balancers(&["web", "api"])).unwrap();
        let balancers = server.balancers();
        assert_eq!(balancers.len(), 2);
        assert!(balancers.contains_key("web") && balancers.contains_key("api"));
    }
}
