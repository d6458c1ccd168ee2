use super::types::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
use crate::context::Context;
use crate::error::PolicyError;
use crate::metrics;
use crate::policy::events::fire;
use crate::policy::{
    generate_policy_key, Classifier, Operation, Policy, PolicyEvents, TracingEvents,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound for a break window that would overflow `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Stops calling a failing operation for a cooldown period.
///
/// All state lives behind one mutex that is never held across an await, so
/// admission and transitions are linearizable and rejection never blocks.
pub struct CircuitBreakerPolicy<E> {
    policy_key: String,
    failure_threshold: u32,
    break_duration: Duration,
    classifier: Classifier<E>,
    events: Arc<dyn PolicyEvents<E>>,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    phase: Phase,
    metrics: CircuitBreakerMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
    Isolated,
}

impl Phase {
    fn circuit_state(&self) -> CircuitState {
        match self {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
            Phase::Isolated => CircuitState::Isolated,
        }
    }
}

/// How a call got past the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    /// Admitted while closed
    Normal,
    /// The single half-open probe
    Trial,
}

/// Releases the half-open trial slot if the call ends without a verdict,
/// e.g. when its future is dropped.
struct TrialSlot<'b, E> {
    breaker: &'b CircuitBreakerPolicy<E>,
    armed: bool,
}

impl<E> Drop for TrialSlot<'_, E> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_trial();
        }
    }
}

impl<E: Display + 'static> CircuitBreakerPolicy<E> {
    pub fn builder() -> CircuitBreakerPolicyBuilder<E> {
        CircuitBreakerPolicyBuilder::new()
    }

    /// Builder seeded from a config section
    pub fn from_config(config: &CircuitBreakerConfig) -> CircuitBreakerPolicyBuilder<E> {
        CircuitBreakerPolicyBuilder::new()
            .failure_threshold(config.failure_threshold)
            .break_duration(config.break_duration())
    }
}

impl<E> CircuitBreakerPolicy<E> {
    pub fn policy_key(&self) -> &str {
        &self.policy_key
    }

    /// Current state. An open circuit whose window has elapsed reports
    /// `HalfOpen` even before the next call performs the transition.
    pub fn state(&self) -> CircuitState {
        match self.state.lock().phase {
            Phase::Open { until } if Instant::now() >= until => CircuitState::HalfOpen,
            phase => phase.circuit_state(),
        }
    }

    /// Consecutive handled failures counted while closed
    pub fn consecutive_failures(&self) -> u32 {
        match self.state.lock().phase {
            Phase::Closed {
                consecutive_failures,
            } => consecutive_failures,
            _ => 0,
        }
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.state.lock().metrics.clone()
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn break_duration(&self) -> Duration {
        self.break_duration
    }

    /// Hold the circuit open until [`reset`](Self::reset) is called
    pub fn isolate(&self) {
        let from = {
            let mut state = self.state.lock();
            let from = state.phase.circuit_state();
            state.phase = Phase::Isolated;
            from
        };

        warn!(policy_key = %self.policy_key, from = %from, "Circuit breaker isolated");
        metrics::record_circuit_breaker_transition(&self.policy_key, from, CircuitState::Isolated);
    }

    /// Close the circuit and clear the failure count
    pub fn reset(&self) {
        let from = {
            let mut state = self.state.lock();
            let from = state.phase.circuit_state();
            state.phase = Phase::Closed {
                consecutive_failures: 0,
            };
            if from == CircuitState::Closed {
                return;
            }
            state.metrics.circuit_closed_count += 1;
            from
        };

        info!(policy_key = %self.policy_key, from = %from, "Circuit breaker manually reset");
        metrics::record_circuit_breaker_transition(&self.policy_key, from, CircuitState::Closed);
        fire(&self.policy_key, "on_reset", || {
            self.events.on_reset(&self.policy_key, None)
        });
    }

    /// Check if a call can proceed, moving an expired open circuit to half-open
    fn admit(&self, context: &Context) -> Result<Permit, PolicyError<E>> {
        let now = Instant::now();
        let admission = {
            let mut state = self.state.lock();

            let admission = match state.phase {
                Phase::Closed { .. } => Ok((Permit::Normal, false)),
                Phase::Open { until } if now >= until => {
                    state.phase = Phase::HalfOpen {
                        trial_in_flight: true,
                    };
                    state.metrics.circuit_half_opened_count += 1;
                    Ok((Permit::Trial, true))
                }
                Phase::Open { until } => Err(Some(until - now)),
                Phase::HalfOpen {
                    trial_in_flight: false,
                } => {
                    state.phase = Phase::HalfOpen {
                        trial_in_flight: true,
                    };
                    Ok((Permit::Trial, false))
                }
                Phase::HalfOpen {
                    trial_in_flight: true,
                } => Err(Some(Duration::ZERO)),
                Phase::Isolated => Err(None),
            };

            match admission {
                Ok(_) => state.metrics.total_requests += 1,
                Err(_) => state.metrics.rejected_requests += 1,
            }
            admission
        };

        match admission {
            Ok((permit, half_opened)) => {
                if half_opened {
                    metrics::record_circuit_breaker_transition(
                        &self.policy_key,
                        CircuitState::Open,
                        CircuitState::HalfOpen,
                    );
                    fire(&self.policy_key, "on_half_open", || {
                        self.events.on_half_open(&self.policy_key, context)
                    });
                }
                if permit == Permit::Trial {
                    debug!(
                        policy_key = %self.policy_key,
                        execution_key = context.execution_key(),
                        "Allowing half-open trial call"
                    );
                }
                Ok(permit)
            }
            Err(retry_after) => {
                debug!(
                    policy_key = %self.policy_key,
                    execution_key = context.execution_key(),
                    retry_after = ?retry_after,
                    "Circuit breaker open, rejecting call"
                );
                metrics::record_circuit_breaker_rejected(&self.policy_key);
                Err(PolicyError::CircuitBroken {
                    policy_key: self.policy_key.clone(),
                    retry_after,
                })
            }
        }
    }

    /// Record a successful call
    fn record_success(&self, permit: Permit, context: &Context) {
        let closed = {
            let mut state = self.state.lock();
            state.metrics.successful_requests += 1;

            match (state.phase, permit) {
                (Phase::Closed { .. }, _) => {
                    state.phase = Phase::Closed {
                        consecutive_failures: 0,
                    };
                    false
                }
                (Phase::HalfOpen { .. }, Permit::Trial) => {
                    state.phase = Phase::Closed {
                        consecutive_failures: 0,
                    };
                    state.metrics.circuit_closed_count += 1;
                    true
                }
                // A call admitted before the circuit opened has no say
                _ => false,
            }
        };

        if closed {
            info!(policy_key = %self.policy_key, "Circuit breaker closing");
            metrics::record_circuit_breaker_transition(
                &self.policy_key,
                CircuitState::HalfOpen,
                CircuitState::Closed,
            );
            fire(&self.policy_key, "on_reset", || {
                self.events.on_reset(&self.policy_key, Some(context))
            });
        }
    }

    /// Record a handled failure
    fn record_failure(&self, permit: Permit, error: &PolicyError<E>, context: &Context) {
        let now = Instant::now();
        let until = now.checked_add(self.break_duration).unwrap_or(now + FAR_FUTURE);

        let opened_from = {
            let mut state = self.state.lock();
            state.metrics.failed_requests += 1;

            match (state.phase, permit) {
                (Phase::Closed { consecutive_failures }, _) => {
                    let consecutive_failures = consecutive_failures + 1;
                    debug!(
                        policy_key = %self.policy_key,
                        consecutive_failures,
                        threshold = self.failure_threshold,
                        "Call failed in closed state"
                    );

                    if consecutive_failures >= self.failure_threshold {
                        state.phase = Phase::Open { until };
                        state.metrics.circuit_opened_count += 1;
                        Some(CircuitState::Closed)
                    } else {
                        state.phase = Phase::Closed {
                            consecutive_failures,
                        };
                        None
                    }
                }
                (Phase::HalfOpen { .. }, Permit::Trial) => {
                    state.phase = Phase::Open { until };
                    state.metrics.circuit_opened_count += 1;
                    Some(CircuitState::HalfOpen)
                }
                _ => None,
            }
        };

        if let Some(from) = opened_from {
            info!(
                policy_key = %self.policy_key,
                from = %from,
                break_ms = self.break_duration.as_millis() as u64,
                "Circuit breaker opening"
            );
            metrics::record_circuit_breaker_transition(&self.policy_key, from, CircuitState::Open);
            fire(&self.policy_key, "on_break", || {
                self.events
                    .on_break(&self.policy_key, error, self.break_duration, context)
            });
        }
    }

    /// Free the half-open trial slot without deciding the circuit
    fn release_trial(&self) {
        let mut state = self.state.lock();
        if let Phase::HalfOpen {
            trial_in_flight: true,
        } = state.phase
        {
            state.phase = Phase::HalfOpen {
                trial_in_flight: false,
            };
        }
    }
}

impl<E> fmt::Debug for CircuitBreakerPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerPolicy")
            .field("policy_key", &self.policy_key)
            .field("failure_threshold", &self.failure_threshold)
            .field("break_duration", &self.break_duration)
            .field("state", &self.state.lock().phase)
            .finish()
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for CircuitBreakerPolicy<E>
where
    T: Send + 'static,
    E: Display + Send + 'static,
{
    fn policy_key(&self) -> &str {
        &self.policy_key
    }

    async fn execute_operation<'a>(
        &'a self,
        operation: Operation<'a, T, E>,
        context: &'a Context,
    ) -> Result<T, PolicyError<E>> {
        context.enter(&self.policy_key);
        let permit = self.admit(context)?;
        let mut slot = TrialSlot {
            breaker: self,
            armed: permit == Permit::Trial,
        };

        let result = operation().await;

        match &result {
            Ok(_) => {
                slot.armed = false;
                self.record_success(permit, context);
            }
            Err(err) if self.classifier.matches(err) => {
                slot.armed = false;
                self.record_failure(permit, err, context);
            }
            Err(err) => {
                debug!(
                    policy_key = %self.policy_key,
                    kind = err.kind(),
                    "Error not counted by circuit breaker"
                );
            }
        }
        drop(slot);

        result
    }
}

/// Builder for [`CircuitBreakerPolicy`]
pub struct CircuitBreakerPolicyBuilder<E> {
    policy_key: Option<String>,
    failure_threshold: u32,
    break_duration: Duration,
    classifier: Classifier<E>,
    events: Arc<dyn PolicyEvents<E>>,
}

impl<E: Display + 'static> CircuitBreakerPolicyBuilder<E> {
    pub fn new() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            policy_key: None,
            failure_threshold: defaults.failure_threshold,
            break_duration: defaults.break_duration(),
            classifier: Classifier::all(),
            events: Arc::new(TracingEvents),
        }
    }
}

impl<E: Display + 'static> Default for CircuitBreakerPolicyBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> CircuitBreakerPolicyBuilder<E> {
    pub fn policy_key(mut self, key: impl Into<String>) -> Self {
        self.policy_key = Some(key.into());
        self
    }

    /// Consecutive handled failures that open the circuit. Values below one
    /// are raised to one.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    /// Only count operation errors matching `predicate`
    pub fn handle<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.classifier.set_predicate(Arc::new(predicate));
        self
    }

    /// Also count timeouts raised by an inner timeout policy
    pub fn handle_timeouts(mut self) -> Self {
        self.classifier = self.classifier.with_timeouts(true);
        self
    }

    pub fn events(mut self, events: Arc<dyn PolicyEvents<E>>) -> Self {
        self.events = events;
        self
    }

    pub(crate) fn classifier(mut self, classifier: Classifier<E>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn build(self) -> CircuitBreakerPolicy<E> {
        let policy_key = self
            .policy_key
            .unwrap_or_else(|| generate_policy_key("CircuitBreaker"));

        info!(
            policy_key = %policy_key,
            failure_threshold = self.failure_threshold,
            break_ms = self.break_duration.as_millis() as u64,
            "Creating circuit breaker"
        );
        metrics::record_circuit_breaker_state(&policy_key, CircuitState::Closed);

        CircuitBreakerPolicy {
            policy_key,
            failure_threshold: self.failure_threshold,
            break_duration: self.break_duration,
            classifier: self.classifier,
            events: self.events,
            state: Mutex::new(State {
                phase: Phase::Closed {
                    consecutive_failures: 0,
                },
                metrics: CircuitBreakerMetrics::default(),
            }),
        }
    }
}
