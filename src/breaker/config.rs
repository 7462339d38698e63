//! Per-command circuit policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Safety margin the builder adds on top of the transport request timeout
/// when deriving an execution budget, so the transport layer (not the
/// circuit) is what normally cancels a slow request.
pub const TIMEOUT_MARGIN: Duration = Duration::from_millis(100);

/// Configuration for one circuit command.
///
/// Covers the execution budget, the concurrency ceiling, and the thresholds
/// that decide when the circuit trips and when it probes for recovery:
///
/// ```rust
/// # use munin::CircuitConfig;
/// # use std::time::Duration;
/// let config = CircuitConfig::new()
///     .timeout(Duration::from_secs(2))
///     .error_percent_threshold(25)
///     .sleep_window(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Wall-clock budget for one guarded execution; exceeding it counts as
    /// a failure. Default: 900ms (the default transport request timeout
    /// plus [`TIMEOUT_MARGIN`]).
    pub timeout: Duration,
    /// Maximum number of concurrent in-flight executions. Default: 100.
    pub max_concurrent: u32,
    /// Failure percentage (0-100) at or above which the circuit opens.
    /// Default: 50.
    pub error_percent_threshold: u8,
    /// Minimum number of requests in the rolling window before the failure
    /// percentage is consulted at all. Default: 3.
    pub request_volume_threshold: u32,
    /// How long an open circuit rejects before admitting a trial request.
    /// Default: 5s.
    pub sleep_window: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(900),
            max_concurrent: 100,
            error_percent_threshold: 50,
            request_volume_threshold: 3,
            sleep_window: Duration::from_secs(5),
        }
    }
}

impl CircuitConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution budget.
    pub fn timeout(mut self, budget: Duration) -> Self {
        self.timeout = budget;
        self
    }

    /// Set the concurrency ceiling.
    pub fn max_concurrent(mut self, n: u32) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Set the failure percentage (0-100) that trips the circuit.
    pub fn error_percent_threshold(mut self, percent: u8) -> Self {
        self.error_percent_threshold = percent;
        self
    }

    /// Set the minimum request volume before the circuit can trip.
    pub fn request_volume_threshold(mut self, n: u32) -> Self {
        self.request_volume_threshold = n;
        self
    }

    /// Set how long the circuit stays open before probing.
    pub fn sleep_window(mut self, window: Duration) -> Self {
        self.sleep_window = window;
        self
    }
}
