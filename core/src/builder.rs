//! Builder API for ergonomic circuit breaker configuration

use crate::{
    callbacks::Callbacks,
    circuit::{CircuitBreaker, CircuitState, Config},
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
#[derive(Debug)]
pub struct CircuitBuilder {
    name: String,
    config: Config,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            callbacks: Callbacks::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Consecutive failures needed to open the circuit (0 = default of 5)
    pub fn max_failures(mut self, failures: usize) -> Self {
        self.config.max_failures = failures;
        self
    }

    /// How long the circuit stays open before probing (zero = default of 30s)
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    /// Probes admitted while half-open, and successes required to close (0 = default of 3)
    pub fn max_half_open_requests(mut self, requests: usize) -> Self {
        self.config.max_half_open_requests = requests;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Observe every state transition
    ///
    /// Delivery is asynchronous; the observer runs off the caller's path and
    /// may see transitions slightly after they happen.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.callbacks.on_state_change = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::with_callbacks(self.name, self.config, self.callbacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let circuit = CircuitBuilder::new("test").build();

        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.config().max_failures, 5);
        assert_eq!(circuit.config().open_timeout, Duration::from_secs(30));
        assert_eq!(circuit.config().max_half_open_requests, 3);
    }

    #[test]
    fn test_builder_custom_config() {
        let circuit = CircuitBuilder::new("test")
            .max_failures(10)
            .open_timeout(Duration::from_secs(60))
            .max_half_open_requests(1)
            .jitter_factor(0.1)
            .build();

        assert!(circuit.is_closed());
        assert_eq!(circuit.config().max_failures, 10);
        assert_eq!(circuit.config().open_timeout, Duration::from_secs(60));
        assert_eq!(circuit.config().max_half_open_requests, 1);
    }

    #[test]
    fn test_builder_normalizes_zero_values() {
        let circuit = CircuitBuilder::new("test")
            .max_failures(0)
            .open_timeout(Duration::ZERO)
            .build();

        assert_eq!(circuit.config().max_failures, 5);
        assert_eq!(circuit.config().open_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_builder_with_callbacks() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let circuit = CircuitBuilder::new("test")
            .max_failures(2)
            .on_open(move |name| {
                let _ = tx.send(name.to_string());
            })
            .build();

        // Trigger failures to open circuit
        let _ = circuit.execute(|| async { Err::<(), _>("error 1") }).await;
        let _ = circuit.execute(|| async { Err::<(), _>("error 2") }).await;

        // Callback is delivered off the caller's path
        let opened = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(opened.as_deref(), Some("test"));
    }
}
