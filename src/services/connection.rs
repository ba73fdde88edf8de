//! Outbound connections to dependent services.
//!
//! A `Connection` is a long-lived handle to one service: it can be probed
//! for health and carries JSON calls for the typed clients built on top of
//! it. `HttpConnector` produces reqwest-backed connections.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Health status reported by a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Serving,
    NotServing,
    #[serde(other)]
    Unknown,
}

/// Body of a health endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ServingStatus,
}

/// A live connection to one named service.
#[async_trait]
pub trait Connection: Send + Sync {
    fn name(&self) -> &str;

    /// Probe the service's health endpoint once.
    async fn check(&self) -> Result<ServingStatus, ServiceError>;

    /// Invoke `method` with a JSON payload and return the JSON reply.
    async fn call(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError>;

    /// Tear the connection down. Later probes and calls fail with `Closed`.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens connections from configured addresses.
pub trait Connector: Send + Sync {
    fn connect(&self, name: &str, addr: &str) -> Result<Arc<dyn Connection>, ServiceError>;
}

type ClientFactory = Arc<dyn Fn(Arc<dyn Connection>) -> Arc<dyn Any + Send + Sync> + Send + Sync>;

/// How to reach one service and which typed client to build on the connection.
#[derive(Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub addr: String,
    new_client: ClientFactory,
}

impl ServiceConfig {
    pub fn new<C, F>(name: impl Into<String>, addr: impl Into<String>, new_client: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(Arc<dyn Connection>) -> C + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            addr: addr.into(),
            new_client: Arc::new(move |conn| Arc::new(new_client(conn)) as Arc<dyn Any + Send + Sync>),
        }
    }

    pub(crate) fn build_client(&self, conn: Arc<dyn Connection>) -> Arc<dyn Any + Send + Sync> {
        (self.new_client)(conn)
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

/// Builds [`HttpConnection`]s sharing one reqwest client.
pub struct HttpConnector {
    http: reqwest::Client,
}

impl HttpConnector {
    /// `request_timeout` bounds every probe and call.
    pub fn new(request_timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ServiceError::ConnectFailed {
                name: "http".to_string(),
                addr: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { http })
    }
}

impl Connector for HttpConnector {
    fn connect(&self, name: &str, addr: &str) -> Result<Arc<dyn Connection>, ServiceError> {
        let base = normalize_addr(addr).map_err(|reason| ServiceError::ConnectFailed {
            name: name.to_string(),
            addr: addr.to_string(),
            reason,
        })?;
        tracing::debug!(service = name, base = %base, "Opened service connection");
        Ok(Arc::new(HttpConnection {
            name: name.to_string(),
            base,
            http: self.http.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Connection to a service speaking JSON over HTTP.
///
/// Health lives at `GET {base}/health`, calls at `POST {base}/{method}`.
pub struct HttpConnection {
    name: String,
    base: Url,
    http: reqwest::Client,
    closed: AtomicBool,
}

impl HttpConnection {
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, ServiceError> {
        self.base.join(path).map_err(|e| ServiceError::CallFailed {
            name: self.name.clone(),
            method: path.to_string(),
            reason: e.to_string(),
        })
    }

    fn ensure_open(&self) -> Result<(), ServiceError> {
        if self.is_closed() {
            return Err(ServiceError::Closed {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<ServingStatus, ServiceError> {
        self.ensure_open()?;
        let probe_failed = |reason: String| ServiceError::ProbeFailed {
            name: self.name.clone(),
            reason,
        };

        let response = self
            .http
            .get(self.url("health")?)
            .send()
            .await
            .map_err(|e| probe_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(probe_failed(format!("HTTP {status}")));
        }

        let body: HealthResponse = response
            .json()
            .await
            .map_err(|e| probe_failed(format!("invalid health response: {e}")))?;
        Ok(body.status)
    }

    async fn call(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError> {
        self.ensure_open()?;
        let call_failed = |reason: String| ServiceError::CallFailed {
            name: self.name.clone(),
            method: method.to_string(),
            reason,
        };

        let response = self
            .http
            .post(self.url(method)?)
            .json(&payload)
            .send()
            .await
            .map_err(|e| call_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(call_failed(format!("HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| call_failed(format!("invalid response: {e}")))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(service = %self.name, "Closed service connection");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Turn `:port`, `host:port` or a full URL into a base URL ending in `/`.
pub fn normalize_addr(addr: &str) -> Result<Url, String> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err("empty address".to_string());
    }

    let raw = if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else if addr.starts_with(':') {
        format!("http://127.0.0.1{addr}")
    } else {
        format!("http://{addr}")
    };

    let mut url = Url::parse(&raw).map_err(|e| format!("invalid address {addr:?}: {e}"))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(format!("address {addr:?} has no host"));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
