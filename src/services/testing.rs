//! Scriptable connections for pool and readiness tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::ServiceError;
use crate::services::connection::{Connection, Connector, ServingStatus};

/// How a mock service answers health probes.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Probe errors until `after` has elapsed since creation, then serving.
    ServingAfter(Duration),
    /// Always reports the given status.
    Always(ServingStatus),
    /// Every probe fails with a transport-style error.
    Refused,
    /// Every probe blocks forever.
    Hang,
}

pub struct MockConnection {
    name: String,
    behavior: Behavior,
    created: Instant,
    pub probes: AtomicUsize,
    pub closes: AtomicUsize,
    pub calls: Mutex<Vec<(String, serde_json::Value)>>,
    pub reply: Mutex<serde_json::Value>,
}

impl MockConnection {
    pub fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            created: Instant::now(),
            probes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            reply: Mutex::new(serde_json::Value::Null),
        })
    }

    pub fn with_reply(self: Arc<Self>, reply: serde_json::Value) -> Arc<Self> {
        *self.reply.lock().unwrap() = reply;
        self
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<ServingStatus, ServiceError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::ServingAfter(after) if self.created.elapsed() >= *after => {
                Ok(ServingStatus::Serving)
            }
            Behavior::ServingAfter(_) | Behavior::Refused => Err(ServiceError::ProbeFailed {
                name: self.name.clone(),
                reason: "connection refused".to_string(),
            }),
            Behavior::Always(status) => Ok(*status),
            Behavior::Hang => std::future::pending().await,
        }
    }

    async fn call(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), payload));
        Ok(self.reply.lock().unwrap().clone())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closes.load(Ordering::SeqCst) > 0
    }
}

/// Hands out pre-built mocks by name; unknown names fail to connect.
#[derive(Default)]
pub struct MockConnector {
    conns: HashMap<String, Arc<MockConnection>>,
}

impl MockConnector {
    pub fn with(mut self, conn: Arc<MockConnection>) -> Self {
        self.conns.insert(conn.name.clone(), conn);
        self
    }
}

impl Connector for MockConnector {
    fn connect(&self, name: &str, addr: &str) -> Result<Arc<dyn Connection>, ServiceError> {
        self.conns
            .get(name)
            .map(|c| Arc::clone(c) as Arc<dyn Connection>)
            .ok_or_else(|| ServiceError::ConnectFailed {
                name: name.to_string(),
                addr: addr.to_string(),
                reason: "no route to host".to_string(),
            })
    }
}
