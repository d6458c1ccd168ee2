pub mod breaker;
pub mod registry;
pub mod types;

pub use breaker::{CircuitBreakerPolicy, CircuitBreakerPolicyBuilder};
pub use registry::CircuitBreakerRegistry;
pub use types::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
