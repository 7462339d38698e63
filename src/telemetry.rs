//! Telemetry metric name constants.
//!
//! Centralised metric names for munin operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `munin_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `command`: circuit command name the request ran under
//! - `status`: outcome, "ok" or "error"
//! - `tier`: cache tier, "live" or "stale"
//! - `state`: circuit state entered, "open", "half_open" or "closed"
//! - `reason`: rejection reason, "open" or "max_concurrency"

/// Total fetches dispatched through a client, cache hits included.
///
/// Labels: `command`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "munin_requests_total";

/// Fetch duration in seconds, cache hits included.
///
/// Labels: `command`.
pub const REQUEST_DURATION_SECONDS: &str = "munin_request_duration_seconds";

/// Total cache hits, per tier.
///
/// A hit on the "stale" tier means a degraded response was served in place
/// of a failed fetch.
///
/// Labels: `tier` ("live" | "stale").
pub const CACHE_HITS_TOTAL: &str = "munin_cache_hits_total";

/// Total cache misses, per tier.
///
/// Labels: `tier` ("live" | "stale").
pub const CACHE_MISSES_TOTAL: &str = "munin_cache_misses_total";

/// Total circuit state transitions, labeled by the state entered.
///
/// Labels: `command`, `state` ("open" | "half_open" | "closed").
pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "munin_circuit_transitions_total";

/// Total calls rejected by a circuit without running the primary action.
///
/// Labels: `command`, `reason` ("open" | "max_concurrency").
pub const CIRCUIT_REJECTIONS_TOTAL: &str = "munin_circuit_rejections_total";
