//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use jk_balancer::config::{BackendConfig, BalancerConfig, ProxyConfig, RouteConfig};
use jk_balancer::http::server::Balancers;
use jk_balancer::transport::{
    BackendTransport, Forwarded, ProxyRequest, TransportError, TransportFactory,
};
use jk_balancer::{HttpServer, Shutdown};

// ---------------------------------------------------------------------------
// Mock TCP backends
// ---------------------------------------------------------------------------

/// Read one request head (GET-style, no body).
async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Start a programmable backend on an ephemeral port. `f` gets the request
/// head and returns the raw bytes written back before the socket is closed.
pub async fn start_raw_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = String> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let response = f(head).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Backend answering `200` with `"<name> <request line>"` and a session
/// cookie routed to itself.
pub async fn start_named_backend(name: &'static str) -> SocketAddr {
    start_raw_backend(move |head| async move {
        let request_line = head.lines().next().unwrap_or_default().to_string();
        let body = format!("{name} {request_line}");
        format!(
            "HTTP/1.1 200 OK\r\nSet-Cookie: JSESSIONID=s1.{name}; Path=/\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    })
    .await
}

/// Backend echoing the raw request head as its body.
pub async fn start_echo_backend() -> SocketAddr {
    start_raw_backend(|head| async move {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            head.len(),
            head
        )
    })
    .await
}

/// Backend that promises a body and hangs up half way through it.
pub async fn start_truncating_backend() -> SocketAddr {
    start_raw_backend(|_| async move {
        "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\npartial".to_string()
    })
    .await
}

/// An address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

// ---------------------------------------------------------------------------
// Proxy harness
// ---------------------------------------------------------------------------

pub fn backend(name: &str, addr: SocketAddr, lb_factor: i64) -> BackendConfig {
    BackendConfig {
        name: name.to_string(),
        address: addr.to_string(),
        lb_factor,
        ..BackendConfig::default()
    }
}

/// One balancer `web` over `backends`, mounted on `/app`.
pub fn web_config(backends: Vec<BackendConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.timeouts.connect_secs = 1;
    config.timeouts.request_secs = 5;
    config.balancers.push(BalancerConfig {
        name: "web".to_string(),
        members: backends.iter().map(|b| b.name.clone()).collect(),
        ..BalancerConfig::default()
    });
    config.backends = backends;
    config.routes.push(RouteConfig {
        name: "app".to_string(),
        host: None,
        path_prefix: Some("/app".to_string()),
        balancer: "web".to_string(),
        priority: 0,
    });
    config
}

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub balancers: Arc<Balancers>,
    pub handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let server = HttpServer::new(config).unwrap();
    let balancers = server.balancers();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let handle = tokio::spawn(server.run(listener, shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    RunningProxy {
        addr,
        shutdown,
        balancers,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Script {
    #[default]
    Ok,
    Recoverable,
    Fatal,
}

#[derive(Debug, Default, Clone)]
pub struct ScriptedFactory {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    calls: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFactory {
    pub fn script(&self, backend: &str, script: Script) {
        self.scripts.lock().unwrap().insert(backend.to_string(), script);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

impl TransportFactory for ScriptedFactory {
    type Transport = ScriptedTransport;

    fn create(&self, backend: &BackendConfig) -> Result<ScriptedTransport, TransportError> {
        Ok(ScriptedTransport {
            name: backend.name.clone(),
            factory: self.clone(),
        })
    }
}

#[derive(Debug)]
pub struct ScriptedTransport {
    name: String,
    factory: ScriptedFactory,
}

#[async_trait]
impl BackendTransport for ScriptedTransport {
    type Connection = ();
    type Response = String;

    async fn acquire(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn forward(&self, _connection: &mut (), _request: &ProxyRequest) -> Forwarded<String> {
        self.factory.calls.lock().unwrap().push(self.name.clone());
        let script = self
            .factory
            .scripts
            .lock()
            .unwrap()
            .get(&self.name)
            .copied()
            .unwrap_or_default();
        match script {
            Script::Ok => Forwarded::Success(self.name.clone()),
            Script::Recoverable => Forwarded::Failed { recoverable: true },
            Script::Fatal => Forwarded::Failed { recoverable: false },
        }
    }

    fn shutdown(&self) {
        self.factory.closed.lock().unwrap().push(self.name.clone());
    }
}
