//! Composable fault-tolerance policies for async operations.
//!
//! Build a [`RetryPolicy`], [`CircuitBreakerPolicy`], [`FallbackPolicy`] or
//! [`TimeoutPolicy`] once, optionally stack them in a [`PolicyWrap`], and run
//! any fallible async closure through it with [`PolicyExt::execute`].

pub mod api;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod metrics;
pub mod policy;
pub mod retry;
pub mod timeout;
pub mod wrap;

pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerPolicy, CircuitBreakerRegistry,
    CircuitState,
};
pub use config::ResilienceConfig;
pub use context::Context;
pub use error::{PolicyError, ResilienceError, Result};
pub use fallback::FallbackPolicy;
pub use policy::{Classifier, NoopEvents, Operation, Policy, PolicyEvents, PolicyExt, TracingEvents};
pub use retry::{RetryConfig, RetryPolicy};
pub use timeout::TimeoutPolicy;
pub use wrap::PolicyWrap;

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resilience=debug,values_api=debug,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
