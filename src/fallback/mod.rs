//! Substitute a value for a handled failure.

use crate::context::Context;
use crate::error::PolicyError;
use crate::metrics;
use crate::policy::events::fire;
use crate::policy::{
    generate_policy_key, Classifier, Operation, Policy, PolicyEvents, TracingEvents,
};
use async_trait::async_trait;
use std::fmt::{self, Display};
use std::sync::Arc;
use tracing::debug;

/// Produces the substitute value from the failure that triggered it
pub type FallbackFn<T, E> =
    Arc<dyn Fn(&PolicyError<E>, &Context) -> Result<T, E> + Send + Sync>;

/// Replaces handled failures with a static value or a computed one.
///
/// A failing factory surfaces as [`PolicyError::Inner`] and is neither
/// retried nor handled again by this policy.
pub struct FallbackPolicy<T, E> {
    policy_key: String,
    factory: FallbackFn<T, E>,
    classifier: Classifier<E>,
    events: Arc<dyn PolicyEvents<E>>,
}

impl<T, E> FallbackPolicy<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Display + 'static,
{
    /// Fall back to a clone of `value`
    pub fn value(value: T) -> FallbackPolicyBuilder<T, E> {
        FallbackPolicyBuilder::new(Arc::new(move |_: &PolicyError<E>, _: &Context| {
            Ok::<T, E>(value.clone())
        }))
    }
}

impl<T, E: Display + 'static> FallbackPolicy<T, E> {
    /// Fall back to whatever `factory` computes from the error and context
    pub fn factory<F>(factory: F) -> FallbackPolicyBuilder<T, E>
    where
        F: Fn(&PolicyError<E>, &Context) -> Result<T, E> + Send + Sync + 'static,
    {
        FallbackPolicyBuilder::new(Arc::new(factory))
    }
}

impl<T, E> FallbackPolicy<T, E> {
    pub fn policy_key(&self) -> &str {
        &self.policy_key
    }
}

impl<T, E> fmt::Debug for FallbackPolicy<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("policy_key", &self.policy_key)
            .field("classifier", &self.classifier)
            .finish()
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for FallbackPolicy<T, E>
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

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !self.classifier.matches(&err) {
            debug!(
                policy_key = %self.policy_key,
                kind = err.kind(),
                "Error not handled by fallback"
            );
            return Err(err);
        }

        fire(&self.policy_key, "on_fallback", || {
            self.events.on_fallback(&self.policy_key, &err, context)
        });
        metrics::record_fallback(&self.policy_key, err.kind());

        (self.factory)(&err, context).map_err(PolicyError::Inner)
    }
}

/// Builder for [`FallbackPolicy`]
pub struct FallbackPolicyBuilder<T, E> {
    policy_key: Option<String>,
    factory: FallbackFn<T, E>,
    classifier: Classifier<E>,
    events: Arc<dyn PolicyEvents<E>>,
}

impl<T, E: Display + 'static> FallbackPolicyBuilder<T, E> {
    fn new(factory: FallbackFn<T, E>) -> Self {
        Self {
            policy_key: None,
            factory,
            classifier: Classifier::all(),
            events: Arc::new(TracingEvents),
        }
    }
}

impl<T, E> FallbackPolicyBuilder<T, E> {
    pub fn policy_key(mut self, key: impl Into<String>) -> Self {
        self.policy_key = Some(key.into());
        self
    }

    /// Only fall back for operation errors matching `predicate`
    pub fn handle<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.classifier.set_predicate(Arc::new(predicate));
        self
    }

    /// Also fall back when an inner timeout policy gives up
    pub fn handle_timeouts(mut self) -> Self {
        self.classifier = self.classifier.with_timeouts(true);
        self
    }

    /// Also fall back when an inner circuit breaker rejects the call
    pub fn handle_broken_circuit(mut self) -> Self {
        self.classifier = self.classifier.with_broken_circuit(true);
        self
    }

    pub fn events(mut self, events: Arc<dyn PolicyEvents<E>>) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> FallbackPolicy<T, E> {
        FallbackPolicy {
            policy_key: self
                .policy_key
                .unwrap_or_else(|| generate_policy_key("Fallback")),
            factory: self.factory,
            classifier: self.classifier,
            events: self.events,
        }
    }
}
