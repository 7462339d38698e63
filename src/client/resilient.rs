//! The resilient GET client: cache, circuit, and stale fallback wiring.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::breaker::{CircuitConfig, CircuitRegistry, CircuitState};
use crate::cache::{ResponseCache, stale_key};
use crate::error::{MuninError, Result};
use crate::telemetry;
use crate::transport::{HttpTransport, StatusOutcome, classify_status};

/// GET client that layers a live response cache, a circuit breaker, and a
/// stale-cache fallback over an [`HttpTransport`].
///
/// Built via [`Munin::builder()`](crate::Munin::builder). One request flows
/// through three stages:
///
/// 1. live cache lookup, keyed by URL;
/// 2. on a miss, a guarded upstream GET under this client's circuit
///    command, caching the body on success;
/// 3. on any failure, the stale tier as fallback.
///
/// Errors that exhaust all three stages come back as
/// [`MuninError::RequestFailed`] wrapping the underlying cause.
pub struct ResilientClient {
    transport: Arc<dyn HttpTransport>,
    cache: Arc<ResponseCache>,
    circuits: Arc<CircuitRegistry>,
    headers: HashMap<String, String>,
    command: String,
    live_cache: bool,
    live_ttl: Duration,
    stale_cache: bool,
    stale_ttl: Duration,
    success_status: u16,
}

impl ResilientClient {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: Arc<dyn HttpTransport>,
        cache: Arc<ResponseCache>,
        circuits: Arc<CircuitRegistry>,
        headers: HashMap<String, String>,
        command: String,
        live_cache: bool,
        live_ttl: Duration,
        stale_cache: bool,
        stale_ttl: Duration,
        success_status: u16,
    ) -> Self {
        Self {
            transport,
            cache,
            circuits,
            headers,
            command,
            live_cache,
            live_ttl,
            stale_cache,
            stale_ttl,
            success_status,
        }
    }

    /// Fetch `url`, serving from cache when possible and falling back to a
    /// stale copy when the upstream or the circuit refuses.
    #[instrument(skip(self), fields(command = %self.command))]
    pub async fn get(&self, url: &str) -> Result<String> {
        let start = Instant::now();

        if self.live_cache {
            if let Some(body) = self.cache.get(url).await {
                debug!(url, "live cache hit");
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "live").increment(1);
                Self::record_request(&self.command, start, true);
                return Ok(body);
            }
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "tier" => "live").increment(1);
        }

        let result = self
            .circuits
            .execute(
                &self.command,
                || self.fetch_upstream(url),
                |cause| self.resolve_stale(url, cause),
            )
            .await;

        Self::record_request(&self.command, start, result.is_ok());
        result.map_err(|cause| MuninError::RequestFailed {
            url: url.to_string(),
            source: Box::new(cause),
        })
    }

    /// Drop every cached response and all circuit state.
    pub fn flush_all(&self) {
        self.cache.flush();
        self.circuits.flush();
    }

    /// Install or replace the circuit policy for `command`, taking effect
    /// immediately, including for a breaker that is already live.
    pub fn update_circuit_config(&self, command: impl Into<String>, config: CircuitConfig) {
        self.circuits.configure(command, config);
    }

    /// Current state of this client's circuit, if it has seen traffic.
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.circuits.state(&self.command)
    }

    /// The circuit command this client executes under.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Handle to the underlying response cache, for sharing with other
    /// clients via
    /// [`MuninBuilder::shared_cache()`](crate::MuninBuilder::shared_cache).
    pub fn cache(&self) -> Arc<ResponseCache> {
        self.cache.clone()
    }

    /// Handle to the underlying circuit registry, for sharing with other
    /// clients via
    /// [`MuninBuilder::shared_circuits()`](crate::MuninBuilder::shared_circuits).
    pub fn circuits(&self) -> Arc<CircuitRegistry> {
        self.circuits.clone()
    }

    /// Primary action: one upstream GET, classified against the configured
    /// success status. Populates the cache tiers on success.
    async fn fetch_upstream(&self, url: &str) -> Result<String> {
        let response = self.transport.get(url, &self.headers).await?;
        match classify_status(response.status, self.success_status) {
            StatusOutcome::Success => {
                if self.live_cache {
                    self.cache
                        .insert(url, response.body.clone(), self.live_ttl)
                        .await;
                }
                // The stale tier is written independently of the live tier,
                // so a client running without a live cache still accrues
                // fallback material.
                if self.stale_cache {
                    self.cache
                        .insert(stale_key(url), response.body.clone(), self.stale_ttl)
                        .await;
                }
                Ok(response.body)
            }
            StatusOutcome::Failure => Err(MuninError::UnexpectedStatus {
                status: response.status,
                url: url.to_string(),
            }),
        }
    }

    /// Fallback: serve the stale tier if enabled and populated, otherwise
    /// surface what sent us here.
    async fn resolve_stale(&self, url: &str, cause: MuninError) -> Result<String> {
        if !self.stale_cache {
            return Err(cause);
        }
        match self.cache.get(&stale_key(url)).await {
            Some(body) => {
                warn!(url, cause = %cause, "serving stale response");
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tier" => "stale").increment(1);
                Ok(body)
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "tier" => "stale").increment(1);
                Err(MuninError::StaleMiss(Box::new(cause)))
            }
        }
    }

    /// Record request outcome metrics (counter + histogram).
    fn record_request(command: &str, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        let elapsed = start.elapsed().as_secs_f64();
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "command" => command.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "command" => command.to_owned(),
        )
        .record(elapsed);
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("command", &self.command)
            .field("live_cache", &self.live_cache)
            .field("stale_cache", &self.stale_cache)
            .field("success_status", &self.success_status)
            .finish_non_exhaustive()
    }
}
