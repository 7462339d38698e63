//! Builder for configuring client instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::ResilientClient;
use crate::breaker::{CircuitConfig, CircuitRegistry, TIMEOUT_MARGIN};
use crate::cache::{CacheConfig, ResponseCache};
use crate::error::Result;
use crate::transport::{HttpTransport, ReqwestTransport, TransportConfig};

/// Circuit command a client executes under when none is configured.
pub const DEFAULT_COMMAND: &str = "default";

/// How long live responses are served from cache. Default: 1 minute.
pub const DEFAULT_LIVE_TTL: Duration = Duration::from_secs(60);

/// How long stale copies stay available for fallback. Default: 24 hours.
pub const DEFAULT_STALE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Main entry point for creating clients.
pub struct Munin;

impl Munin {
    /// Create a new builder for configuring a client.
    pub fn builder() -> MuninBuilder {
        MuninBuilder::new()
    }
}

/// Builder for configuring client instances.
///
/// ```rust,no_run
/// # use munin::Munin;
/// # fn main() -> munin::Result<()> {
/// let client = Munin::builder()
///     .command("catalog")
///     .header("Authorization", "Bearer token")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct MuninBuilder {
    headers: HashMap<String, String>,
    command: Option<String>,
    live_cache: bool,
    live_ttl: Duration,
    stale_cache: bool,
    stale_ttl: Duration,
    success_status: u16,
    transport_config: TransportConfig,
    cache_config: CacheConfig,
    circuit_config: Option<CircuitConfig>,
    transport: Option<Arc<dyn HttpTransport>>,
    shared_cache: Option<Arc<ResponseCache>>,
    shared_circuits: Option<Arc<CircuitRegistry>>,
}

impl MuninBuilder {
    pub fn new() -> Self {
        Self {
            headers: HashMap::new(),
            command: None,
            live_cache: true,
            live_ttl: DEFAULT_LIVE_TTL,
            stale_cache: true,
            stale_ttl: DEFAULT_STALE_TTL,
            success_status: 200,
            transport_config: TransportConfig::default(),
            cache_config: CacheConfig::default(),
            circuit_config: None,
            transport: None,
            shared_cache: None,
            shared_circuits: None,
        }
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replace the full set of headers sent with every request.
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Set the circuit command this client executes under. Clients with the
    /// same command on the same registry share one circuit.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Enable or disable the live response cache.
    pub fn live_cache(mut self, enabled: bool) -> Self {
        self.live_cache = enabled;
        self
    }

    /// Set how long live responses are served from cache.
    pub fn live_ttl(mut self, ttl: Duration) -> Self {
        self.live_ttl = ttl;
        self
    }

    /// Enable or disable the stale-cache fallback.
    pub fn stale_cache(mut self, enabled: bool) -> Self {
        self.stale_cache = enabled;
        self
    }

    /// Set how long stale copies stay available for fallback.
    pub fn stale_ttl(mut self, ttl: Duration) -> Self {
        self.stale_ttl = ttl;
        self
    }

    /// Set the one response status that counts as success. Default: 200.
    pub fn success_status(mut self, status: u16) -> Self {
        self.success_status = status;
        self
    }

    /// Configure the default reqwest transport.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Configure the response cache created by this builder.
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Set the circuit policy for this client's command.
    ///
    /// Used as given, including its `timeout`. Without this, the command
    /// runs under a config whose execution budget is derived from the
    /// transport request timeout plus a safety margin.
    pub fn circuit_config(mut self, config: CircuitConfig) -> Self {
        self.circuit_config = Some(config);
        self
    }

    /// Substitute a custom transport. The transport config is then ignored
    /// except for deriving the default circuit budget.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an existing response cache instead of creating one. Clients
    /// sharing a cache serve each other's entries.
    pub fn shared_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    /// Share an existing circuit registry instead of creating one. Clients
    /// sharing a registry see the same breaker per command.
    pub fn shared_circuits(mut self, circuits: Arc<CircuitRegistry>) -> Self {
        self.shared_circuits = Some(circuits);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ResilientClient> {
        if self.stale_cache && self.stale_ttl <= self.live_ttl {
            warn!(
                live_ttl_secs = self.live_ttl.as_secs(),
                stale_ttl_secs = self.stale_ttl.as_secs(),
                "stale TTL does not exceed live TTL, fallback will rarely have anything to serve"
            );
        }

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.transport_config)?),
        };

        let cache = self
            .shared_cache
            .unwrap_or_else(|| Arc::new(ResponseCache::with_config(&self.cache_config)));

        let circuits = self.shared_circuits.unwrap_or_else(|| {
            // Default budget keeps the circuit from timing out before the
            // transport does.
            let derived = self.circuit_config.clone().unwrap_or_else(|| {
                CircuitConfig::new()
                    .timeout(self.transport_config.request_timeout + TIMEOUT_MARGIN)
            });
            Arc::new(CircuitRegistry::new(derived))
        });

        let command = self.command.unwrap_or_else(|| DEFAULT_COMMAND.to_string());
        if let Some(config) = self.circuit_config {
            circuits.configure(&command, config);
        }

        Ok(ResilientClient::new(
            transport,
            cache,
            circuits,
            self.headers,
            command,
            self.live_cache,
            self.live_ttl,
            self.stale_cache,
            self.stale_ttl,
            self.success_status,
        ))
    }
}

impl Default for MuninBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_and_tiers() {
        let client = Munin::builder().build().unwrap();
        assert_eq!(client.command(), DEFAULT_COMMAND);
    }

    #[test]
    fn custom_command_is_kept() {
        let client = Munin::builder().command("catalog").build().unwrap();
        assert_eq!(client.command(), "catalog");
    }

    #[test]
    fn derived_circuit_budget_exceeds_transport_timeout() {
        let transport_config = TransportConfig::new().request_timeout(Duration::from_secs(2));
        let client = Munin::builder()
            .transport_config(transport_config)
            .command("slow-upstream")
            .build()
            .unwrap();
        let breaker = client.circuits().breaker("slow-upstream");
        assert_eq!(
            breaker.config().timeout,
            Duration::from_secs(2) + TIMEOUT_MARGIN
        );
    }

    #[test]
    fn explicit_circuit_config_is_installed_for_the_command() {
        let client = Munin::builder()
            .command("orders")
            .circuit_config(CircuitConfig::new().request_volume_threshold(7))
            .build()
            .unwrap();
        let breaker = client.circuits().breaker("orders");
        assert_eq!(breaker.config().request_volume_threshold, 7);
    }

    #[test]
    fn clients_can_share_cache_and_circuits() {
        let first = Munin::builder().build().unwrap();
        let second = Munin::builder()
            .shared_cache(first.cache())
            .shared_circuits(first.circuits())
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(&first.cache(), &second.cache()));
        assert!(Arc::ptr_eq(&first.circuits(), &second.circuits()));
    }
}
