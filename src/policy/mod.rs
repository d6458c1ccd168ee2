//! The policy abstraction shared by every fault-handling layer.
//!
//! A policy receives an [`Operation`] and a [`Context`] and either returns the
//! operation's value or a classified [`PolicyError`]. Policies hold no per-call
//! state, so one instance serves any number of concurrent executions.

pub mod classify;
pub mod events;

pub use classify::Classifier;
pub use events::{NoopEvents, PolicyEvents, TracingEvents};

use crate::context::Context;
use crate::error::PolicyError;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// A deferred unit of work as seen by policy layers.
///
/// It is `Fn` rather than `FnMut` so that every layer of a wrap can invoke it
/// again on retry.
pub type Operation<'a, T, E> =
    Arc<dyn Fn() -> BoxFuture<'a, Result<T, PolicyError<E>>> + Send + Sync + 'a>;

/// A composable fault-handling wrapper around a fallible operation
#[async_trait]
pub trait Policy<T, E>: Send + Sync
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Diagnostic label of this policy instance
    fn policy_key(&self) -> &str;

    /// Run `operation` under this policy's rule
    async fn execute_operation<'a>(
        &'a self,
        operation: Operation<'a, T, E>,
        context: &'a Context,
    ) -> Result<T, PolicyError<E>>;
}

/// Convenience entry points for plain async closures
pub trait PolicyExt<T, E>: Policy<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Execute `operation` under this policy. Errors returned by the
    /// operation surface as [`PolicyError::Inner`] unless a layer handles them.
    fn execute<'a, F, Fut>(
        &'a self,
        context: &'a Context,
        operation: F,
    ) -> BoxFuture<'a, Result<T, PolicyError<E>>>
    where
        F: Fn() -> Fut + Send + Sync + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
    {
        let operation: Operation<'a, T, E> = Arc::new(move || {
            let attempt = operation();
            async move { attempt.await.map_err(PolicyError::Inner) }.boxed()
        });
        self.execute_operation(operation, context)
    }
}

impl<T, E, P> PolicyExt<T, E> for P
where
    P: Policy<T, E> + ?Sized,
    T: Send + 'static,
    E: Send + 'static,
{
}

/// Generate a policy key like `Retry-1a2b3c4d` when the caller gives none
pub(crate) fn generate_policy_key(kind: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", kind, &id[..8])
}
