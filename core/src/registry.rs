//! Named circuit breakers shared across a process
//!
//! Callers that protect the same dependency look it up by name and get the
//! same `Arc<CircuitBreaker>`. The first caller to ask for a name decides its
//! configuration; later lookups ignore the config they pass.

use crate::builder::CircuitBuilder;
use crate::circuit::{CircuitBreaker, CircuitStats, Config};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Breaker for `name`, created with default configuration on first use
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_with_config(name, Config::default())
    }

    /// Breaker for `name`, created with `config` if it does not exist yet
    pub fn get_with_config(&self, name: &str, config: Config) -> Arc<CircuitBreaker> {
        self.get_or_build(CircuitBuilder::new(name).config(config))
    }

    /// Breaker named by the builder, built from it if it does not exist yet
    pub fn get_or_build(&self, builder: CircuitBuilder) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(builder.name()) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        // Another caller may have inserted it between the two locks
        if let Some(breaker) = breakers.get(builder.name()) {
            return Arc::clone(breaker);
        }

        let name = builder.name().to_string();
        let breaker = Arc::new(builder.build());
        tracing::debug!(circuit = %name, "registered circuit breaker");
        breakers.insert(name, Arc::clone(&breaker));
        breaker
    }

    /// Snapshot of every registered breaker, sorted by name
    pub fn all_stats(&self) -> Vec<CircuitStats> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().values().cloned().collect();
        let mut stats: Vec<CircuitStats> = breakers.iter().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }
}
