//! Munin error types

use std::time::Duration;

/// Munin error types
#[derive(Debug, thiserror::Error)]
pub enum MuninError {
    // Transport errors
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream answered, but not with the configured success status.
    ///
    /// Produced by the orchestrator's status classification; the response
    /// body is discarded. For circuit accounting this is indistinguishable
    /// from a transport failure.
    #[error("unexpected status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    // Circuit rejections (synthetic: the primary action never ran,
    // or was cut short by the execution budget)
    #[error("circuit '{command}' is open")]
    CircuitOpen { command: String },

    #[error("too many concurrent requests for circuit '{command}'")]
    MaxConcurrency { command: String },

    #[error("circuit '{command}' timed out after {budget:?}")]
    Timeout { command: String, budget: Duration },

    /// The fallback found nothing to serve: no stale entry under the stale
    /// key. Wraps the failure that sent us to the fallback in the first
    /// place.
    #[error("no stale response available")]
    StaleMiss(#[source] Box<MuninError>),

    /// The caller-visible wrapper: both the primary path and the fallback
    /// were exhausted.
    #[error("could not complete the request for {url}")]
    RequestFailed {
        url: String,
        #[source]
        source: Box<MuninError>,
    },

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MuninError {
    /// Whether this error was produced by the circuit itself rather than by
    /// running the primary action (open-circuit short-circuits). Rejections
    /// of this kind do not feed the rolling window.
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, MuninError::CircuitOpen { .. })
    }

    /// Walk the `source` chain down to the originating failure.
    ///
    /// `get()` wraps executor errors in [`MuninError::RequestFailed`] and the
    /// fallback wraps misses in [`MuninError::StaleMiss`]; this unwraps both
    /// layers so callers can match on what actually went wrong upstream.
    pub fn root_cause(&self) -> &MuninError {
        match self {
            MuninError::RequestFailed { source, .. } => source.root_cause(),
            MuninError::StaleMiss(source) => source.root_cause(),
            _ => self,
        }
    }
}

/// Result type alias for Munin operations
pub type Result<T> = std::result::Result<T, MuninError>;
