//! Bound how long one execution of the inner operation may take.

use crate::context::Context;
use crate::error::PolicyError;
use crate::metrics;
use crate::policy::events::fire;
use crate::policy::{generate_policy_key, Operation, Policy, PolicyEvents, TracingEvents};
use async_trait::async_trait;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Gives up on the inner operation after a fixed duration.
///
/// Expiry drops the inner future, so whatever it was awaiting is cancelled.
pub struct TimeoutPolicy<E> {
    policy_key: String,
    timeout: Duration,
    events: Arc<dyn PolicyEvents<E>>,
}

impl<E: Display + 'static> TimeoutPolicy<E> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            policy_key: generate_policy_key("Timeout"),
            timeout,
            events: Arc::new(TracingEvents),
        }
    }

    /// Build from a config value in seconds
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }
}

impl<E> TimeoutPolicy<E> {
    pub fn with_policy_key(mut self, key: impl Into<String>) -> Self {
        self.policy_key = key.into();
        self
    }

    pub fn with_events(mut self, events: Arc<dyn PolicyEvents<E>>) -> Self {
        self.events = events;
        self
    }

    pub fn policy_key(&self) -> &str {
        &self.policy_key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<E> fmt::Debug for TimeoutPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutPolicy")
            .field("policy_key", &self.policy_key)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for TimeoutPolicy<E>
where
    T: Send + 'static,
    E: Send + 'static,
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

        match tokio::time::timeout(self.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => {
                debug!(
                    policy_key = %self.policy_key,
                    execution_key = context.execution_key(),
                    "Inner operation dropped after timeout"
                );
                fire(&self.policy_key, "on_timeout", || {
                    self.events.on_timeout(&self.policy_key, self.timeout, context)
                });
                metrics::record_timeout(&self.policy_key);
                Err(PolicyError::TimedOut {
                    policy_key: self.policy_key.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }
}
