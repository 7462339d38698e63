//! Circuit breaking for guarded request execution.
//!
//! Each command name owns an independent [`CircuitBreaker`] holding a
//! three-state machine:
//!
//! - **Closed**: requests run normally; outcomes feed a rolling window.
//!   When the window holds enough volume and the failure percentage crosses
//!   the configured threshold, the circuit opens.
//! - **Open**: requests are rejected without running. After the sleep
//!   window elapses, the next caller is admitted as a single trial request.
//! - **Half-open**: exactly one probe is in flight. Success closes the
//!   circuit and clears the window; failure, or a probe dropped by its
//!   caller, re-opens it and restarts the sleep window.
//!
//! Breakers are shared across clients through a [`CircuitRegistry`], which
//! creates them on first use per command name. Internal state lives behind
//! `std::sync` locks; critical sections are short and never held across an
//! await point.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{MuninError, Result};
use crate::telemetry;

mod config;
mod registry;
mod window;

pub use config::{CircuitConfig, TIMEOUT_MARGIN};
pub use registry::CircuitRegistry;

use window::RollingWindow;

/// Observable state of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    /// Metric label for this state.
    pub fn as_label(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Per-command breaker guarding primary executions.
///
/// `execute()` runs a primary action under the circuit's admission rules,
/// concurrency ceiling, and execution budget, and routes every failure
/// (including synthetic rejections that never ran the action) through the
/// caller's fallback.
pub struct CircuitBreaker {
    command: String,
    config: RwLock<CircuitConfig>,
    /// Lock-free state word; transitions go through compare-and-swap so a
    /// racing probe outcome cannot clobber a newer transition.
    state: AtomicU8,
    window: Mutex<RollingWindow>,
    /// When the circuit last opened; the sleep window is measured from here.
    opened_at: RwLock<Option<Instant>>,
    in_flight: AtomicU32,
    /// Single-probe gate for the half-open state.
    probe_in_flight: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(command: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            command: command.into(),
            config: RwLock::new(config),
            state: AtomicU8::new(CircuitState::Closed as u8),
            window: Mutex::new(RollingWindow::new(Instant::now())),
            opened_at: RwLock::new(None),
            in_flight: AtomicU32::new(0),
            probe_in_flight: AtomicBool::new(false),
        }
    }

    /// The command name this breaker guards.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Current state of the circuit.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Snapshot of the policy currently in force.
    pub fn config(&self) -> CircuitConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace this breaker's policy in place. Applies to subsequent
    /// admissions; executions already in flight keep the budget they
    /// started with.
    pub fn reconfigure(&self, config: CircuitConfig) {
        *self.config.write().unwrap() = config;
    }

    /// Run `primary` under the circuit, routing any failure through
    /// `fallback`.
    ///
    /// The fallback receives the cause: a [`MuninError::CircuitOpen`] or
    /// [`MuninError::MaxConcurrency`] rejection, a [`MuninError::Timeout`]
    /// when the execution budget elapsed, or whatever error the primary
    /// itself returned. Whatever the fallback returns is the caller's
    /// result.
    ///
    /// Dropping the returned future mid-flight releases whatever admission
    /// it held: a concurrency slot goes back, and an unfinished probe
    /// re-opens the circuit with a fresh sleep window.
    pub async fn execute<T, P, PFut, F, FFut>(&self, primary: P, fallback: F) -> Result<T>
    where
        P: FnOnce() -> PFut,
        PFut: Future<Output = Result<T>>,
        F: FnOnce(MuninError) -> FFut,
        FFut: Future<Output = Result<T>>,
    {
        let (budget, max_concurrent) = {
            let config = self.config.read().unwrap();
            (config.timeout, config.max_concurrent)
        };

        let probe = match self.state() {
            CircuitState::Closed => false,
            CircuitState::Open => {
                if self.sleep_window_elapsed() && self.claim_probe() {
                    // Sole holder of the probe gate; move the state over.
                    if self
                        .state
                        .compare_exchange(
                            CircuitState::Open as u8,
                            CircuitState::HalfOpen as u8,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.log_transition(CircuitState::HalfOpen);
                    }
                    true
                } else {
                    self.record_rejection("open");
                    return fallback(MuninError::CircuitOpen {
                        command: self.command.clone(),
                    })
                    .await;
                }
            }
            CircuitState::HalfOpen => {
                if self.claim_probe() {
                    true
                } else {
                    self.record_rejection("open");
                    return fallback(MuninError::CircuitOpen {
                        command: self.command.clone(),
                    })
                    .await;
                }
            }
        };

        // The probe bypasses the concurrency ceiling: it is singular by
        // construction and must be able to run even when the ceiling is
        // misconfigured below 1.
        let slot = if probe {
            None
        } else {
            match self.acquire_slot(max_concurrent) {
                Some(slot) => Some(slot),
                None => {
                    self.record_rejection("max_concurrency");
                    self.record_outcome(false);
                    return fallback(MuninError::MaxConcurrency {
                        command: self.command.clone(),
                    })
                    .await;
                }
            }
        };

        // If the caller drops this future at the await below, the slot
        // guard returns the capacity and an unsettled probe guard re-opens
        // the circuit.
        let probe_guard = if probe {
            Some(ProbeGuard {
                breaker: self,
                settled: false,
            })
        } else {
            None
        };

        let outcome = tokio::time::timeout(budget, primary()).await;
        // The primary is done; capacity frees before any fallback work.
        drop(slot);

        let result = match outcome {
            Ok(inner) => inner,
            Err(_) => Err(MuninError::Timeout {
                command: self.command.clone(),
                budget,
            }),
        };

        match probe_guard {
            Some(guard) => guard.settle(result.is_ok()),
            None => self.record_outcome(result.is_ok()),
        }

        match result {
            Ok(value) => Ok(value),
            Err(cause) => fallback(cause).await,
        }
    }

    // ========================================================================
    // Admission
    // ========================================================================

    fn sleep_window_elapsed(&self) -> bool {
        let sleep_window = self.config.read().unwrap().sleep_window;
        match *self.opened_at.read().unwrap() {
            Some(opened_at) => opened_at.elapsed() >= sleep_window,
            None => true,
        }
    }

    /// Try to become the one in-flight probe.
    fn claim_probe(&self) -> bool {
        self.probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Reserve an in-flight slot below the concurrency ceiling. The slot
    /// goes back when the returned guard drops.
    fn acquire_slot(&self, max_concurrent: u32) -> Option<SlotGuard<'_>> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max_concurrent).then_some(current + 1)
            })
            .ok()
            .map(|_| SlotGuard {
                in_flight: &self.in_flight,
            })
    }

    // ========================================================================
    // Outcome recording
    // ========================================================================

    /// Feed an outcome into the rolling window and trip the circuit if the
    /// window now crosses both thresholds.
    ///
    /// The check runs for successes too: a success can supply the volume
    /// that pushes an already failing window over the line.
    fn record_outcome(&self, succeeded: bool) {
        let now = Instant::now();
        let totals = {
            let mut window = self.window.lock().unwrap();
            if succeeded {
                window.record_success(now);
            } else {
                window.record_failure(now);
            }
            window.totals(now)
        };
        let (volume_threshold, percent_threshold) = {
            let config = self.config.read().unwrap();
            (
                config.request_volume_threshold,
                u32::from(config.error_percent_threshold),
            )
        };
        if totals.volume >= volume_threshold && totals.error_percent() >= percent_threshold {
            self.trip_open(totals.failures, totals.volume);
        }
    }

    /// Resolve the half-open probe: close on success, re-open on failure.
    ///
    /// The window and the sleep-window start are published before the state
    /// CAS lands, so an admission racing the transition never observes a
    /// state whose companion fields are stale.
    fn settle_probe(&self, succeeded: bool) {
        if succeeded {
            self.window.lock().unwrap().reset();
            *self.opened_at.write().unwrap() = None;
            if self
                .state
                .compare_exchange(
                    CircuitState::HalfOpen as u8,
                    CircuitState::Closed as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                self.log_transition(CircuitState::Closed);
            }
        } else {
            *self.opened_at.write().unwrap() = Some(Instant::now());
            if self
                .state
                .compare_exchange(
                    CircuitState::HalfOpen as u8,
                    CircuitState::Open as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                self.log_transition(CircuitState::Open);
            }
        }
        self.probe_in_flight.store(false, Ordering::Release);
    }

    /// The probe future was dropped before it settled. Re-open with a
    /// fresh sleep window and release the gate.
    fn abandon_probe(&self) {
        *self.opened_at.write().unwrap() = Some(Instant::now());
        if self
            .state
            .compare_exchange(
                CircuitState::HalfOpen as u8,
                CircuitState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            warn!(command = %self.command, "trial request abandoned, circuit re-opened");
            metrics::counter!(telemetry::CIRCUIT_TRANSITIONS_TOTAL,
                "command" => self.command.clone(),
                "state" => CircuitState::Open.as_label(),
            )
            .increment(1);
        }
        self.probe_in_flight.store(false, Ordering::Release);
    }

    fn trip_open(&self, failures: u32, volume: u32) {
        // Stamp the sleep-window start before the state flips; a racing
        // admission must never see Open without a start time.
        *self.opened_at.write().unwrap() = Some(Instant::now());
        if self
            .state
            .compare_exchange(
                CircuitState::Closed as u8,
                CircuitState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            warn!(
                command = %self.command,
                failures,
                volume,
                "failure threshold crossed, opening circuit"
            );
            metrics::counter!(telemetry::CIRCUIT_TRANSITIONS_TOTAL,
                "command" => self.command.clone(),
                "state" => CircuitState::Open.as_label(),
            )
            .increment(1);
        }
    }

    fn log_transition(&self, state: CircuitState) {
        match state {
            CircuitState::Closed => info!(command = %self.command, "circuit closed"),
            CircuitState::HalfOpen => {
                info!(command = %self.command, "circuit half-open, admitting a trial request");
            }
            CircuitState::Open => {
                warn!(command = %self.command, "trial request failed, circuit re-opened");
            }
        }
        metrics::counter!(telemetry::CIRCUIT_TRANSITIONS_TOTAL,
            "command" => self.command.clone(),
            "state" => state.as_label(),
        )
        .increment(1);
    }

    fn record_rejection(&self, reason: &'static str) {
        debug!(command = %self.command, reason, "rejecting request");
        metrics::counter!(telemetry::CIRCUIT_REJECTIONS_TOTAL,
            "command" => self.command.clone(),
            "reason" => reason,
        )
        .increment(1);
    }
}

/// One unit of in-flight capacity, returned on drop.
///
/// Held across the primary await so a caller that abandons the execute
/// future still gives the slot back.
struct SlotGuard<'a> {
    in_flight: &'a AtomicU32,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Exclusive claim on the half-open trial, resolved exactly once.
///
/// `settle` reports the probe's outcome. A guard dropped unsettled means
/// the probe future was cancelled mid-flight; the circuit re-opens and the
/// gate is released.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl ProbeGuard<'_> {
    fn settle(mut self, succeeded: bool) {
        self.settled = true;
        self.breaker.settle_probe(succeeded);
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon_probe();
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("command", &self.command)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
