//! Callback system for circuit breaker state transitions
//!
//! Observers are fire-and-forget: delivery happens off the caller's path (on
//! the Tokio blocking pool when a runtime is available, otherwise on a detached
//! thread) so a slow observer never holds up the breaker.

use crate::circuit::CircuitState;
use std::sync::Arc;

/// Observer receiving `(circuit, from, to)` on every transition
pub type StateChangeFn = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Observer receiving the circuit name when a specific state is entered
pub type StateEnteredFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks for circuit breaker events
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_state_change: Option<StateChangeFn>,
    pub on_open: Option<StateEnteredFn>,
    pub on_close: Option<StateEnteredFn>,
    pub on_half_open: Option<StateEnteredFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.on_state_change.is_none()
            && self.on_open.is_none()
            && self.on_close.is_none()
            && self.on_half_open.is_none()
    }

    /// Schedule delivery of a transition without waiting for it
    pub fn notify(&self, circuit: &str, from: CircuitState, to: CircuitState) {
        if self.is_empty() {
            return;
        }

        let callbacks = self.clone();
        let circuit = circuit.to_string();
        let deliver = move || callbacks.deliver(&circuit, from, to);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(deliver);
            }
            Err(_) => {
                std::thread::spawn(deliver);
            }
        }
    }

    fn deliver(&self, circuit: &str, from: CircuitState, to: CircuitState) {
        if let Some(ref callback) = self.on_state_change {
            callback(circuit, from, to);
        }

        let entered = match to {
            CircuitState::Open => &self.on_open,
            CircuitState::Closed => &self.on_close,
            CircuitState::HalfOpen => &self.on_half_open,
        };
        if let Some(callback) = entered {
            callback(circuit);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}
