//! Compose policies into one, outermost first.

use crate::context::Context;
use crate::error::PolicyError;
use crate::policy::{generate_policy_key, Operation, Policy};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// An ordered stack of policies acting as one.
///
/// `[P1, P2, P3]` executes as `P1(|| P2(|| P3(operation)))`. Order matters:
/// a retry outside a circuit breaker stops at the first rejection, while a
/// breaker outside a retry only sees the aggregate outcome of the loop.
pub struct PolicyWrap<T, E> {
    policy_key: String,
    policies: Vec<Arc<dyn Policy<T, E>>>,
}

impl<T, E> PolicyWrap<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Wrap `policies`, outermost first
    pub fn new(policies: Vec<Arc<dyn Policy<T, E>>>) -> Self {
        Self {
            policy_key: generate_policy_key("PolicyWrap"),
            policies,
        }
    }

    pub fn builder() -> PolicyWrapBuilder<T, E> {
        PolicyWrapBuilder {
            policy_key: None,
            policies: Vec::new(),
        }
    }
}

impl<T, E> PolicyWrap<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn policy_key(&self) -> &str {
        &self.policy_key
    }

    /// Keys of the wrapped policies, outermost first
    pub fn policy_keys(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.policy_key()).collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl<T, E> fmt::Debug for PolicyWrap<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyWrap")
            .field("policy_key", &self.policy_key)
            .field("policies", &self.policy_keys())
            .finish()
    }
}

/// Run `operation` under `policies[0]`, whose inner operation is the rest of
/// the stack.
fn nest<'a, T, E>(
    policies: &'a [Arc<dyn Policy<T, E>>],
    operation: Operation<'a, T, E>,
    context: &'a Context,
) -> BoxFuture<'a, Result<T, PolicyError<E>>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    match policies.split_first() {
        None => operation(),
        Some((outer, rest)) => {
            let inner: Operation<'a, T, E> =
                Arc::new(move || nest(rest, operation.clone(), context));
            outer.execute_operation(inner, context)
        }
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for PolicyWrap<T, E>
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
        nest(&self.policies, operation, context).await
    }
}

/// Builder for [`PolicyWrap`]
pub struct PolicyWrapBuilder<T, E> {
    policy_key: Option<String>,
    policies: Vec<Arc<dyn Policy<T, E>>>,
}

impl<T, E> PolicyWrapBuilder<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn policy_key(mut self, key: impl Into<String>) -> Self {
        self.policy_key = Some(key.into());
        self
    }

    /// Add a policy inside the ones already added
    pub fn wrap<P>(self, policy: P) -> Self
    where
        P: Policy<T, E> + 'static,
    {
        self.wrap_shared(Arc::new(policy))
    }

    /// Add a policy that is also used elsewhere, e.g. a shared breaker
    pub fn wrap_shared(mut self, policy: Arc<dyn Policy<T, E>>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn build(self) -> PolicyWrap<T, E> {
        PolicyWrap {
            policy_key: self
                .policy_key
                .unwrap_or_else(|| generate_policy_key("PolicyWrap")),
            policies: self.policies,
        }
    }
}
