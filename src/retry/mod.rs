pub mod delay;
pub mod policy;
pub mod types;

pub use delay::{Delay, DelayFn};
pub use policy::{RetryPolicy, RetryPolicyBuilder};
pub use types::{BackoffKind, RetryConfig};
