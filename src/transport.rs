//! HTTP transport abstraction and the reqwest-backed default.
//!
//! [`HttpTransport`] is the seam between the resilience machinery and the
//! actual network: the client core never touches reqwest directly, so tests
//! and embedders can substitute their own transport.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{MuninError, Result};

/// Configuration for the default reqwest transport.
///
/// ```rust
/// # use munin::TransportConfig;
/// # use std::time::Duration;
/// let config = TransportConfig::new().request_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Budget for establishing a connection. Default: 500ms.
    pub connect_timeout: Duration,
    /// End-to-end budget for one request, response body included.
    /// Default: 800ms.
    pub request_timeout: Duration,
    /// Idle keep-alive connections retained per host. Default: 100.
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_millis(800),
            pool_max_idle_per_host: 100,
        }
    }
}

impl TransportConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection-establishment budget.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the end-to-end request budget.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the keep-alive pool size per host.
    pub fn pool_max_idle_per_host(mut self, n: usize) -> Self {
        self.pool_max_idle_per_host = n;
        self
    }
}

/// Status line and body of an upstream response, before any
/// success/failure classification.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// How a response status counts against the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Success,
    Failure,
}

/// Classify a response status against the configured success status.
///
/// Only an exact match passes: a 201 or a redirect counts as a failure the
/// same as a 500, and its body is never cached or surfaced.
pub fn classify_status(status: u16, success_status: u16) -> StatusOutcome {
    if status == success_status {
        StatusOutcome::Success
    } else {
        StatusOutcome::Failure
    }
}

/// Issues a GET and returns the raw status and body.
///
/// Implementations map every transport-level problem (DNS, connect,
/// timeout, body read) to [`MuninError::Transport`]; a response with a
/// non-success status is NOT an error at this layer.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<TransportResponse>;
}

/// Default transport backed by a shared reqwest client with keep-alive
/// pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| MuninError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<TransportResponse> {
        let mut request = self.http.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| MuninError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| MuninError::Transport(e.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}
