use crate::circuit_breaker::CircuitState;
use crate::error::{ResilienceError, Result};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the Prometheus recorder. Only one recorder may exist per process.
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ResilienceError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        // Retry metrics
        describe_counter!(
            "resilience_retry_attempts_total",
            "Total number of retries scheduled after a handled failure"
        );
        describe_counter!(
            "resilience_retries_exhausted_total",
            "Total number of executions that spent their whole retry budget"
        );

        // Circuit breaker metrics
        describe_gauge!(
            "resilience_circuit_breaker_state",
            "Circuit breaker state (0 = closed, 1 = open, 2 = half-open, 3 = isolated)"
        );
        describe_counter!(
            "resilience_circuit_breaker_transitions_total",
            "Total number of circuit breaker state transitions"
        );
        describe_counter!(
            "resilience_circuit_breaker_rejected_total",
            "Total number of calls rejected by an open circuit"
        );

        // Fallback and timeout metrics
        describe_counter!(
            "resilience_fallbacks_total",
            "Total number of failures replaced by a fallback value"
        );
        describe_counter!(
            "resilience_timeouts_total",
            "Total number of executions cancelled by a timeout policy"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Get the Prometheus metrics handle
    pub fn handle(&self) -> Arc<PrometheusHandle> {
        self.handle.clone()
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Record a scheduled retry
pub fn record_retry_attempt(policy_key: &str, attempt: u32) {
    let labels = [
        ("policy", policy_key.to_string()),
        ("attempt", attempt.to_string()),
    ];
    counter!("resilience_retry_attempts_total", &labels).increment(1);
}

/// Record a spent retry budget
pub fn record_retries_exhausted(policy_key: &str) {
    let labels = [("policy", policy_key.to_string())];
    counter!("resilience_retries_exhausted_total", &labels).increment(1);
}

/// Record circuit breaker state
pub fn record_circuit_breaker_state(policy_key: &str, state: CircuitState) {
    let labels = [("policy", policy_key.to_string())];
    gauge!("resilience_circuit_breaker_state", &labels).set(state.as_gauge());
}

/// Record circuit breaker transition
pub fn record_circuit_breaker_transition(policy_key: &str, from: CircuitState, to: CircuitState) {
    let labels = [
        ("policy", policy_key.to_string()),
        ("from", from.to_string()),
        ("to", to.to_string()),
    ];
    counter!("resilience_circuit_breaker_transitions_total", &labels).increment(1);
    record_circuit_breaker_state(policy_key, to);
}

/// Record a call rejected by the breaker
pub fn record_circuit_breaker_rejected(policy_key: &str) {
    let labels = [("policy", policy_key.to_string())];
    counter!("resilience_circuit_breaker_rejected_total", &labels).increment(1);
}

/// Record a fallback substitution
pub fn record_fallback(policy_key: &str, error_kind: &str) {
    let labels = [
        ("policy", policy_key.to_string()),
        ("error", error_kind.to_string()),
    ];
    counter!("resilience_fallbacks_total", &labels).increment(1);
}

/// Record a timeout
pub fn record_timeout(policy_key: &str) {
    let labels = [("policy", policy_key.to_string())];
    counter!("resilience_timeouts_total", &labels).increment(1);
}
