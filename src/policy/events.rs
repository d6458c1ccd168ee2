use crate::context::Context;
use crate::error::PolicyError;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Observability hooks fired at policy transitions.
///
/// Every method defaults to a no-op, so implementors only override what they
/// care about. Hooks run synchronously after any breaker lock is released; a
/// panicking hook is caught and logged and never changes the outcome.
pub trait PolicyEvents<E>: Send + Sync {
    /// A matched failure is about to be retried after `delay`
    fn on_retry(
        &self,
        _policy_key: &str,
        _error: &PolicyError<E>,
        _delay: Duration,
        _attempt: u32,
        _context: &Context,
    ) {
    }

    /// The circuit opened for `break_duration`
    fn on_break(
        &self,
        _policy_key: &str,
        _error: &PolicyError<E>,
        _break_duration: Duration,
        _context: &Context,
    ) {
    }

    /// The break window elapsed and a trial call is being admitted
    fn on_half_open(&self, _policy_key: &str, _context: &Context) {}

    /// The circuit closed again. `context` is `None` for a manual reset.
    fn on_reset(&self, _policy_key: &str, _context: Option<&Context>) {}

    /// A matched failure is being replaced by a fallback value
    fn on_fallback(&self, _policy_key: &str, _error: &PolicyError<E>, _context: &Context) {}

    /// The inner operation did not finish within `timeout`
    fn on_timeout(&self, _policy_key: &str, _timeout: Duration, _context: &Context) {}
}

/// Hooks that only log through `tracing`. Used by every builder by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEvents;

impl<E: Display> PolicyEvents<E> for TracingEvents {
    fn on_retry(
        &self,
        policy_key: &str,
        error: &PolicyError<E>,
        delay: Duration,
        attempt: u32,
        context: &Context,
    ) {
        debug!(
            policy_key,
            execution_key = context.execution_key(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Operation failed, retrying after delay"
        );
    }

    fn on_break(
        &self,
        policy_key: &str,
        error: &PolicyError<E>,
        break_duration: Duration,
        context: &Context,
    ) {
        warn!(
            policy_key,
            execution_key = context.execution_key(),
            break_ms = break_duration.as_millis() as u64,
            error = %error,
            "Circuit breaker opened"
        );
    }

    fn on_half_open(&self, policy_key: &str, context: &Context) {
        info!(
            policy_key,
            execution_key = context.execution_key(),
            "Circuit breaker half-open, admitting trial call"
        );
    }

    fn on_reset(&self, policy_key: &str, context: Option<&Context>) {
        info!(
            policy_key,
            execution_key = context.map(Context::execution_key),
            "Circuit breaker closed"
        );
    }

    fn on_fallback(&self, policy_key: &str, error: &PolicyError<E>, context: &Context) {
        info!(
            policy_key,
            execution_key = context.execution_key(),
            error = %error,
            "Returning fallback value"
        );
    }

    fn on_timeout(&self, policy_key: &str, timeout: Duration, context: &Context) {
        warn!(
            policy_key,
            execution_key = context.execution_key(),
            timeout_ms = timeout.as_millis() as u64,
            "Operation timed out"
        );
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl<E> PolicyEvents<E> for NoopEvents {}

/// Run a hook, swallowing and logging any panic it raises
pub(crate) fn fire<F: FnOnce()>(policy_key: &str, hook: &'static str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(policy_key, hook, "Policy hook panicked, ignoring");
    }
}
