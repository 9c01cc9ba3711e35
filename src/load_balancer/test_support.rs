//! Scripted transport and builders shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::{BackendConfig, BalancerConfig};
use crate::load_balancer::balancer::LoadBalancer;
use crate::load_balancer::clock::ManualClock;
use crate::load_balancer::registry::Registry;
use crate::transport::{BackendTransport, Forwarded, ProxyRequest, TransportError, TransportFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Succeed,
    FailRecoverable,
    FailFatal,
    RefuseConnection,
    Closed,
    Hang,
}

#[derive(Debug, Default, Clone)]
struct Script {
    behaviors: Arc<Mutex<HashMap<String, Behavior>>>,
    calls: Arc<Mutex<Vec<String>>>,
    shutdowns: Arc<Mutex<Vec<String>>>,
}

impl Script {
    fn behavior(&self, name: &str) -> Behavior {
        self.behaviors.lock().unwrap().get(name).copied().unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct MockFactory {
    script: Script,
    fail_on: Option<String>,
}

impl MockFactory {
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn set(&self, name: &str, behavior: Behavior) {
        self.script.behaviors.lock().unwrap().insert(name.to_string(), behavior);
    }

    /// Backends that received a forwarded request, in order.
    pub fn calls(&self) -> Vec<String> {
        self.script.calls.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> Vec<String> {
        self.script.shutdowns.lock().unwrap().clone()
    }
}

impl TransportFactory for MockFactory {
    type Transport = MockTransport;

    fn create(&self, backend: &BackendConfig) -> Result<MockTransport, TransportError> {
        if self.fail_on.as_deref() == Some(backend.name.as_str()) {
            return Err(TransportError::InvalidAddress {
                backend: backend.name.clone(),
                address: backend.address.clone(),
            });
        }
        Ok(MockTransport {
            name: backend.name.clone(),
            script: self.script.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MockTransport {
    name: String,
    script: Script,
}

#[async_trait]
impl BackendTransport for MockTransport {
    type Connection = ();
    type Response = String;

    async fn acquire(&self) -> Result<(), TransportError> {
        match self.script.behavior(&self.name) {
            Behavior::RefuseConnection => Err(TransportError::Busy(self.name.clone())),
            Behavior::Closed => Err(TransportError::Closed(self.name.clone())),
            _ => Ok(()),
        }
    }

    async fn forward(&self, _connection: &mut (), request: &ProxyRequest) -> Forwarded<String> {
        self.script.calls.lock().unwrap().push(self.name.clone());
        match self.script.behavior(&self.name) {
            Behavior::Succeed | Behavior::RefuseConnection | Behavior::Closed => {
                let body = String::from_utf8_lossy(&request.body);
                Forwarded::Success(format!("{}:{}", self.name, body))
            }
            Behavior::FailRecoverable => Forwarded::Failed { recoverable: true },
            Behavior::FailFatal => Forwarded::Failed { recoverable: false },
            Behavior::Hang => std::future::pending().await,
        }
    }

    fn shutdown(&self) {
        self.script.shutdowns.lock().unwrap().push(self.name.clone());
    }
}

pub fn backend(name: &str, weight: i64, domain: &str, local: bool) -> BackendConfig {
    BackendConfig {
        name: name.to_string(),
        address: "127.0.0.1:0".to_string(),
        lb_factor: weight,
        domain: domain.to_string(),
        local,
        ..BackendConfig::default()
    }
}

pub fn balancer(members: &[&str]) -> BalancerConfig {
    BalancerConfig {
        name: "lb".to_string(),
        members: members.iter().map(|m| m.to_string()).collect(),
        ..BalancerConfig::default()
    }
}

pub fn registry(
    settings: &BalancerConfig,
    backends: &[BackendConfig],
) -> (Registry<MockTransport>, Arc<ManualClock>, MockFactory) {
    let clock = Arc::new(ManualClock::new(1_000));
    let factory = MockFactory::default();
    let registry = Registry::build(settings, backends, &factory, clock.clone()).unwrap();
    (registry, clock, factory)
}

pub fn load_balancer(
    settings: &BalancerConfig,
    backends: &[BackendConfig],
) -> (LoadBalancer<MockTransport>, Arc<ManualClock>, MockFactory) {
    let clock = Arc::new(ManualClock::new(1_000));
    let factory = MockFactory::default();
    let lb = LoadBalancer::build_with_clock(settings, backends, &factory, clock.clone()).unwrap();
    (lb, clock, factory)
}
