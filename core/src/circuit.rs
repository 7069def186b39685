//! Circuit breaker implementation using state machines
//!
//! The breaker is shared (`Arc<CircuitBreaker>`) between any number of callers.
//! Admission and outcome recording are two short critical sections on one
//! lock; the protected operation itself runs unlocked.

use crate::{callbacks::Callbacks, errors::CircuitError, storage::OutcomeStore};
use parking_lot::Mutex;
use serde::Serialize;
use state_machines::state_machine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Consecutive failures required to open the circuit
    pub max_failures: usize,

    /// How long the circuit stays open before admitting half-open probes
    pub open_timeout: Duration,

    /// Probes admitted while half-open; the same number of successes closes the circuit
    pub max_half_open_requests: usize,

    /// Jitter factor for open_timeout (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_failures: 5,
            open_timeout: Duration::from_secs(30),
            max_half_open_requests: 3,
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    /// Replace zero values with the defaults and clamp the jitter factor
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.max_failures == 0 {
            self.max_failures = defaults.max_failures;
        }
        if self.open_timeout.is_zero() {
            self.open_timeout = defaults.open_timeout;
        }
        if self.max_half_open_requests == 0 {
            self.max_half_open_requests = defaults.max_half_open_requests;
        }
        self.jitter_factor = if self.jitter_factor.is_finite() {
            self.jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

/// Externally visible circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn from_machine(name: &str) -> Self {
        match name {
            "Open" => CircuitState::Open,
            "HalfOpen" => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Diagnostic snapshot of a breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub failures: usize,
    pub successes: usize,
    pub half_open_requests: usize,
    /// Time since the most recent recorded failure
    pub last_failure_ago: Option<Duration>,
}

/// Circuit breaker context - shared data across all states
#[derive(Debug, Clone)]
pub struct CircuitContext {
    pub name: String,
    pub config: Config,
    pub store: Arc<OutcomeStore>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            config: Config::default(),
            store: Arc::new(OutcomeStore::new()),
        }
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    /// Monotonic time of the latest failure; the open timeout runs from here
    pub last_failure_at: f64,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    /// Probes that completed successfully
    pub successes: usize,
    /// Probes admitted so far
    pub admitted: usize,
}

// Define the circuit breaker state machine with dynamic mode
state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,  // Enable dynamic mode for runtime state transitions

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [timeout_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
    }
}

impl Circuit<Closed> {
    /// Trip once the consecutive failure threshold is reached
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        ctx.store.failure_count() >= ctx.config.max_failures
    }
}

impl Circuit<HalfOpen> {
    /// Any failure while probing re-opens the circuit
    fn should_open(&self, _ctx: &CircuitContext) -> bool {
        true
    }

    fn should_close(&self, ctx: &CircuitContext) -> bool {
        self.state_data_half_open()
            .map(|data| data.successes >= ctx.config.max_half_open_requests)
            .unwrap_or(false)
    }
}

impl Circuit<Open> {
    /// Check if the open timeout has strictly elapsed since the last failure
    fn timeout_elapsed(&self, ctx: &CircuitContext) -> bool {
        let Some(data) = self.state_data_open() else {
            return false;
        };
        let elapsed = ctx.store.monotonic_time() - data.last_failure_at;
        elapsed > effective_timeout_secs(&ctx.config)
    }
}

/// Open timeout in seconds, with chrono-machines jitter applied when configured
fn effective_timeout_secs(config: &Config) -> f64 {
    let timeout_secs = config.open_timeout.as_secs_f64();
    if config.jitter_factor > 0.0 {
        let timeout_ms = config.open_timeout.as_millis() as u64;
        let policy = chrono_machines::Policy {
            max_attempts: 1,
            base_delay_ms: timeout_ms,
            multiplier: 1.0,
            max_delay_ms: timeout_ms,
        };
        let jittered_ms = policy.calculate_delay(1, config.jitter_factor);
        (jittered_ms as f64) / 1000.0
    } else {
        timeout_secs
    }
}

struct Inner {
    machine: DynamicCircuit,
    /// Bumped on every transition so stale probe permits can be recognised
    epoch: u64,
}

/// Circuit breaker public API
pub struct CircuitBreaker {
    context: CircuitContext,
    inner: Mutex<Inner>,
    callbacks: Callbacks,
}

impl CircuitBreaker {
    /// Create a new circuit breaker (use builder() for more options)
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        Self::with_callbacks(name.into(), config, Callbacks::new())
    }

    /// Create a circuit breaker with observers (used by builder)
    pub(crate) fn with_callbacks(name: String, config: Config, callbacks: Callbacks) -> Self {
        let context = CircuitContext {
            name,
            config: config.normalized(),
            store: Arc::new(OutcomeStore::new()),
        };
        let machine = DynamicCircuit::new(context.clone());

        Self {
            context,
            inner: Mutex::new(Inner { machine, epoch: 0 }),
            callbacks,
        }
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Rejected calls never invoke `f`. Admitted calls invoke it exactly once
    /// and record exactly one outcome: `Ok` is a success, `Err` a failure.
    /// Cancellation is the operation's business; dropping the returned future
    /// mid-flight records nothing and frees the probe slot it may hold.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut permit = self.admit()?;

        let result = f().await;

        permit.settled = true;
        match result {
            Ok(value) => {
                self.on_success(permit.probe_epoch);
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(CircuitError::Execution(e))
            }
        }
    }

    /// Current state (may still report Open after the timeout; the move to
    /// HalfOpen happens lazily on the next admission check)
    pub fn state(&self) -> CircuitState {
        CircuitState::from_machine(self.inner.lock().machine.current_state())
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Diagnostic snapshot, no side effects
    pub fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock();
        let (successes, half_open_requests) = inner
            .machine
            .half_open_data()
            .map(|d| (d.successes, d.admitted))
            .unwrap_or((0, 0));

        CircuitStats {
            name: self.context.name.clone(),
            state: CircuitState::from_machine(inner.machine.current_state()),
            failures: self.context.store.failure_count(),
            successes,
            half_open_requests,
            last_failure_ago: self.context.store.since_last_failure(),
        }
    }

    /// Clear all counters and force the circuit back to Closed
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let from = CircuitState::from_machine(inner.machine.current_state());

        self.context.store.clear();
        inner.machine = DynamicCircuit::new(self.context.clone());
        inner.epoch += 1;

        if from != CircuitState::Closed {
            tracing::info!(circuit = %self.context.name, from = %from, "circuit manually reset");
            self.callbacks
                .notify(&self.context.name, from, CircuitState::Closed);
        }
    }

    fn admit<E>(&self) -> Result<Permit<'_>, CircuitError<E>> {
        let mut inner = self.inner.lock();

        // Lazy Open -> HalfOpen transition, evaluated only when traffic arrives
        if inner.machine.current_state() == "Open"
            && inner.machine.handle(CircuitEvent::AttemptReset).is_ok()
        {
            self.context.store.reset_failures();
            inner.epoch += 1;
            tracing::info!(circuit = %self.context.name, "circuit half-open, probing recovery");
            self.callbacks
                .notify(&self.context.name, CircuitState::Open, CircuitState::HalfOpen);
        }

        match CircuitState::from_machine(inner.machine.current_state()) {
            CircuitState::Open => {
                let last_failure_at = inner
                    .machine
                    .open_data()
                    .map(|d| d.last_failure_at)
                    .unwrap_or(0.0);
                let remaining = (last_failure_at + self.context.config.open_timeout.as_secs_f64())
                    - self.context.store.monotonic_time();
                tracing::warn!(circuit = %self.context.name, "request rejected, circuit is open");
                Err(CircuitError::Open {
                    circuit: self.context.name.clone(),
                    retry_in: Duration::try_from_secs_f64(remaining).unwrap_or(Duration::ZERO),
                })
            }
            CircuitState::HalfOpen => {
                let limit = self.context.config.max_half_open_requests;
                let epoch = inner.epoch;
                match inner.machine.half_open_data_mut() {
                    Some(data) if data.admitted < limit => {
                        data.admitted += 1;
                        Ok(Permit {
                            breaker: self,
                            probe_epoch: Some(epoch),
                            settled: false,
                        })
                    }
                    _ => {
                        tracing::warn!(
                            circuit = %self.context.name,
                            "request rejected, half-open probe limit reached"
                        );
                        Err(CircuitError::HalfOpenLimitReached {
                            circuit: self.context.name.clone(),
                        })
                    }
                }
            }
            CircuitState::Closed => Ok(Permit {
                breaker: self,
                probe_epoch: None,
                settled: false,
            }),
        }
    }

    fn on_success(&self, probe_epoch: Option<u64>) {
        let mut inner = self.inner.lock();

        match CircuitState::from_machine(inner.machine.current_state()) {
            CircuitState::Closed => self.context.store.reset_failures(),
            CircuitState::HalfOpen => {
                // Only probes admitted in this half-open episode count toward closing
                if probe_epoch != Some(inner.epoch) {
                    return;
                }
                if let Some(data) = inner.machine.half_open_data_mut() {
                    data.successes += 1;
                }

                // Try to close the circuit
                if inner.machine.handle(CircuitEvent::Close).is_ok() {
                    self.context.store.reset_failures();
                    inner.epoch += 1;
                    tracing::info!(circuit = %self.context.name, "circuit closed, dependency recovered");
                    self.callbacks
                        .notify(&self.context.name, CircuitState::HalfOpen, CircuitState::Closed);
                }
            }
            // Admitted before the trip; nothing to learn from it now
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        let failures = self.context.store.record_failure();

        let from = CircuitState::from_machine(inner.machine.current_state());
        if from == CircuitState::Open {
            // Late failure from a call admitted before the trip: stay open longer
            if let Some(data) = inner.machine.open_data_mut() {
                data.last_failure_at = self.context.store.monotonic_time();
            }
            return;
        }

        if inner.machine.handle(CircuitEvent::Trip).is_ok() {
            if let Some(data) = inner.machine.open_data_mut() {
                data.last_failure_at = self.context.store.monotonic_time();
            }
            inner.epoch += 1;
            tracing::warn!(
                circuit = %self.context.name,
                from = %from,
                failures,
                "circuit opened"
            );
            self.callbacks
                .notify(&self.context.name, from, CircuitState::Open);
        }
    }

    /// Give back a half-open slot held by a probe that never completed
    fn release_probe(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        if let Some(data) = inner.machine.half_open_data_mut() {
            data.admitted = data.admitted.saturating_sub(1);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("config", &self.context.config)
            .field("state", &self.state())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

/// Admission ticket for one execution
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    /// Set when the call was admitted as a half-open probe
    probe_epoch: Option<u64>,
    settled: bool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled
            && let Some(epoch) = self.probe_epoch
        {
            self.breaker.release_probe(epoch);
        }
    }
}
