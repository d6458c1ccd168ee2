use super::delay::{self, Delay};
use super::types::RetryConfig;
use crate::context::Context;
use crate::error::PolicyError;
use crate::metrics;
use crate::policy::events::fire;
use crate::policy::{
    generate_policy_key, Classifier, Operation, Policy, PolicyEvents, TracingEvents,
};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Replays an operation on handled failures, waiting between attempts
pub struct RetryPolicy<E> {
    policy_key: String,
    max_retries: u32,
    delay: Delay,
    classifier: Classifier<E>,
    events: Arc<dyn PolicyEvents<E>>,
}

impl<E: Display + 'static> RetryPolicy<E> {
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Builder seeded from a config section
    pub fn from_config(config: &RetryConfig) -> RetryPolicyBuilder<E> {
        let mut builder = RetryPolicyBuilder::new().max_retries(config.max_retries);
        builder.delay = delay::from_config(config);
        builder
    }
}

impl<E> RetryPolicy<E> {
    pub fn policy_key(&self) -> &str {
        &self.policy_key
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Fresh delay schedule, as one execution would draw from it
    pub fn delays(&self) -> Delay {
        self.delay.schedule()
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("policy_key", &self.policy_key)
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .field("classifier", &self.classifier)
            .finish()
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for RetryPolicy<E>
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
        let mut delays = self.delay.schedule();
        let mut attempt: u32 = 0;

        loop {
            if context.is_cancelled() {
                return Err(PolicyError::Cancelled);
            }

            debug!(
                policy_key = %self.policy_key,
                execution_key = context.execution_key(),
                attempt = attempt + 1,
                max_retries = self.max_retries,
                "Executing operation"
            );

            let err = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            policy_key = %self.policy_key,
                            attempt = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !self.classifier.matches(&err) {
                debug!(
                    policy_key = %self.policy_key,
                    attempt = attempt + 1,
                    kind = err.kind(),
                    error = %err,
                    "Error not retryable"
                );
                return Err(err);
            }

            if attempt >= self.max_retries {
                warn!(
                    policy_key = %self.policy_key,
                    execution_key = context.execution_key(),
                    attempts = attempt + 1,
                    max_retries = self.max_retries,
                    error = %err,
                    "Operation failed after max retries"
                );
                metrics::record_retries_exhausted(&self.policy_key);
                return Err(err.exhausted(attempt + 1));
            }

            attempt += 1;
            let wait = delays.next_delay(attempt);
            fire(&self.policy_key, "on_retry", || {
                self.events
                    .on_retry(&self.policy_key, &err, wait, attempt, context)
            });
            metrics::record_retry_attempt(&self.policy_key, attempt);
            drop(err);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = context.cancellation().cancelled() => {
                    debug!(
                        policy_key = %self.policy_key,
                        attempt,
                        "Retry delay cancelled"
                    );
                    return Err(PolicyError::Cancelled);
                }
            }
        }
    }
}

/// Builder for [`RetryPolicy`]
pub struct RetryPolicyBuilder<E> {
    policy_key: Option<String>,
    max_retries: u32,
    delay: Delay,
    classifier: Classifier<E>,
    events: Arc<dyn PolicyEvents<E>>,
}

impl<E: Display + 'static> RetryPolicyBuilder<E> {
    pub fn new() -> Self {
        let defaults = RetryConfig::default();
        Self {
            policy_key: None,
            max_retries: defaults.max_retries,
            delay: delay::from_config(&defaults),
            classifier: Classifier::all(),
            events: Arc::new(TracingEvents),
        }
    }
}

impl<E: Display + 'static> Default for RetryPolicyBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryPolicyBuilder<E> {
    pub fn policy_key(mut self, key: impl Into<String>) -> Self {
        self.policy_key = Some(key.into());
        self
    }

    /// Retries after the first attempt. Zero means a single attempt.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn delay<D>(mut self, delay: D) -> Self
    where
        D: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.delay = Delay::function(delay);
        self
    }

    /// Randomized exponential waits, restarted for every execution
    pub fn backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.delay = Delay::Backoff(backoff);
        self
    }

    /// Only retry operation errors matching `predicate`
    pub fn handle<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.classifier.set_predicate(Arc::new(predicate));
        self
    }

    /// Also retry timeouts raised by an inner timeout policy
    pub fn handle_timeouts(mut self) -> Self {
        self.classifier = self.classifier.with_timeouts(true);
        self
    }

    pub fn events(mut self, events: Arc<dyn PolicyEvents<E>>) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> RetryPolicy<E> {
        RetryPolicy {
            policy_key: self
                .policy_key
                .unwrap_or_else(|| generate_policy_key("Retry")),
            max_retries: self.max_retries,
            delay: self.delay,
            classifier: self.classifier,
            events: self.events,
        }
    }
}
