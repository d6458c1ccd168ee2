use super::breaker::CircuitBreakerPolicy;
use super::types::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
use crate::policy::{Classifier, PolicyEvents, TracingEvents};
use dashmap::DashMap;
use std::fmt::{self, Display};
use std::sync::Arc;
use tracing::debug;

/// One circuit breaker per downstream name, all built from the same settings.
///
/// Breakers are created on first use and live as long as the registry.
pub struct CircuitBreakerRegistry<E> {
    /// Circuit breakers per name
    breakers: Arc<DashMap<String, Arc<CircuitBreakerPolicy<E>>>>,
    /// Default configuration
    config: CircuitBreakerConfig,
    classifier: Classifier<E>,
    events: Arc<dyn PolicyEvents<E>>,
}

impl<E: Display + 'static> CircuitBreakerRegistry<E> {
    /// Create a new circuit breaker registry
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: Arc::new(DashMap::new()),
            config,
            classifier: Classifier::all(),
            events: Arc::new(TracingEvents),
        }
    }

    /// Classifier shared by breakers created from now on
    pub fn with_classifier(mut self, classifier: Classifier<E>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Hooks shared by breakers created from now on
    pub fn with_events(mut self, events: Arc<dyn PolicyEvents<E>>) -> Self {
        self.events = events;
        self
    }

    /// Get or create the breaker for `name`; its policy key is `name`
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreakerPolicy<E>> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(name, "Creating new circuit breaker");
                Arc::new(
                    CircuitBreakerPolicy::from_config(&self.config)
                        .policy_key(name)
                        .classifier(self.classifier.clone())
                        .events(self.events.clone())
                        .build(),
                )
            })
            .clone()
    }
}

impl<E> CircuitBreakerRegistry<E> {
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreakerPolicy<E>>> {
        self.breakers.get(name).map(|entry| entry.value().clone())
    }

    /// State of the breaker for `name`; unknown names are closed
    pub fn state(&self, name: &str) -> CircuitState {
        self.breakers
            .get(name)
            .map(|breaker| breaker.state())
            .unwrap_or(CircuitState::Closed)
    }

    pub fn metrics(&self, name: &str) -> Option<CircuitBreakerMetrics> {
        self.breakers.get(name).map(|breaker| breaker.metrics())
    }

    /// Get all names with circuit breakers
    pub fn keys(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    /// Get metrics and state for all breakers
    pub fn all_metrics(&self) -> Vec<(String, CircuitBreakerMetrics, CircuitState)> {
        self.breakers
            .iter()
            .map(|entry| {
                let breaker = entry.value();
                (entry.key().clone(), breaker.metrics(), breaker.state())
            })
            .collect()
    }

    /// Manually close every breaker
    pub fn reset_all(&self) {
        // Release the shard locks before hooks run, they may call back in
        let breakers: Vec<Arc<CircuitBreakerPolicy<E>>> = self
            .breakers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for breaker in breakers {
            breaker.reset();
        }
    }
}

impl<E> Clone for CircuitBreakerRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            breakers: self.breakers.clone(),
            config: self.config.clone(),
            classifier: self.classifier.clone(),
            events: self.events.clone(),
        }
    }
}

impl<E> fmt::Debug for CircuitBreakerRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.breakers.len())
            .field("config", &self.config)
            .finish()
    }
}
