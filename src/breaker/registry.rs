//! Command-keyed registry of circuit breakers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::{MuninError, Result};

use super::{CircuitBreaker, CircuitConfig, CircuitState};

/// Shared home for circuit breakers, keyed by command name.
///
/// Breakers are created lazily on first use, with either a per-command
/// config installed via [`configure()`](Self::configure) or the registry's
/// default. Clients that share a registry share circuit state: a command
/// opened by one client is open for all of them.
pub struct CircuitRegistry {
    default_config: CircuitConfig,
    configs: RwLock<HashMap<String, CircuitConfig>>,
    circuits: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitRegistry {
    /// Create a registry whose breakers fall back to `default_config`.
    pub fn new(default_config: CircuitConfig) -> Self {
        Self {
            default_config,
            configs: RwLock::new(HashMap::new()),
            circuits: RwLock::new(HashMap::new()),
        }
    }

    /// Get the breaker for `command`, creating it on first use.
    pub fn breaker(&self, command: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.circuits.read().unwrap().get(command) {
            return breaker.clone();
        }
        let config = self
            .configs
            .read()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone());
        let mut circuits = self.circuits.write().unwrap();
        // Double-checked: another caller may have created it meanwhile.
        if let Some(breaker) = circuits.get(command) {
            return breaker.clone();
        }
        debug!(command, "creating circuit breaker");
        let breaker = Arc::new(CircuitBreaker::new(command, config));
        circuits.insert(command.to_string(), breaker.clone());
        breaker
    }

    /// Install or replace the config for `command`.
    ///
    /// Takes effect immediately: if the command's breaker already exists it
    /// is reconfigured in place, keeping its current state and window.
    pub fn configure(&self, command: impl Into<String>, config: CircuitConfig) {
        let command = command.into();
        self.configs
            .write()
            .unwrap()
            .insert(command.clone(), config.clone());
        let breaker = self.circuits.read().unwrap().get(&command).cloned();
        if let Some(breaker) = breaker {
            breaker.reconfigure(config);
        }
    }

    /// Current state of a command's circuit, if it has been used.
    pub fn state(&self, command: &str) -> Option<CircuitState> {
        self.circuits
            .read()
            .unwrap()
            .get(command)
            .map(|breaker| breaker.state())
    }

    /// Drop all breakers and their accumulated state. Installed configs
    /// survive and apply again when a command is next used.
    pub fn flush(&self) {
        self.circuits.write().unwrap().clear();
        debug!("flushed all circuit breakers");
    }

    /// Run `primary` under `command`'s breaker. See
    /// [`CircuitBreaker::execute()`].
    pub async fn execute<T, P, PFut, F, FFut>(
        &self,
        command: &str,
        primary: P,
        fallback: F,
    ) -> Result<T>
    where
        P: FnOnce() -> PFut,
        PFut: Future<Output = Result<T>>,
        F: FnOnce(MuninError) -> FFut,
        FFut: Future<Output = Result<T>>,
    {
        self.breaker(command).execute(primary, fallback).await
    }
}

impl Default for CircuitRegistry {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}

impl std::fmt::Debug for CircuitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitRegistry")
            .field("default_config", &self.default_config)
            .finish_non_exhaustive()
    }
}
