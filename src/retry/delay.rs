//! Inter-attempt delays.
//!
//! A delay function maps the 1-based retry index to the time to wait before
//! that retry. It is evaluated once per attempt and need not be monotonic.
//! Config-driven exponential delays come from the `backoff` crate instead and
//! carry state, so every execution draws from its own [`Delay::schedule`].

use super::types::{BackoffKind, RetryConfig};
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Shared, type-erased delay function
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Same wait before every retry
pub fn constant(delay: Duration) -> impl Fn(u32) -> Duration + Send + Sync + Clone + 'static {
    move |_| delay
}

/// `step * attempt`
pub fn linear(step: Duration) -> impl Fn(u32) -> Duration + Send + Sync + Clone + 'static {
    move |attempt| step.saturating_mul(attempt)
}

/// `base ^ attempt` seconds, e.g. 2, 4, 8, ... for `base = 2.0`
pub fn exponential(base: f64) -> impl Fn(u32) -> Duration + Send + Sync + Clone + 'static {
    move |attempt| {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(base.powi(exponent)).unwrap_or(Duration::MAX)
    }
}

/// Randomized exponential backoff starting at `initial` and growing by
/// `multiplier`. The interval stops growing at `max`; each wait is then
/// jittered by the crate's default randomization factor (0.5).
pub fn exponential_backoff(initial: Duration, multiplier: f64, max: Duration) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(initial)
        .with_max_interval(max)
        .with_multiplier(multiplier)
        .with_max_elapsed_time(None) // the retry loop enforces max_retries
        .build()
}

/// Where a retry policy takes its waits from
#[derive(Clone)]
pub enum Delay {
    /// Stateless function of the retry index
    Function(DelayFn),
    /// Stateful backoff, copied fresh for every execution
    Backoff(ExponentialBackoff),
}

impl Delay {
    pub fn function<F>(delay: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Delay::Function(Arc::new(delay))
    }

    /// Start a schedule for one execution
    pub fn schedule(&self) -> Delay {
        match self {
            Delay::Function(delay) => Delay::Function(delay.clone()),
            Delay::Backoff(template) => {
                let mut backoff = template.clone();
                backoff.reset();
                Delay::Backoff(backoff)
            }
        }
    }

    /// Wait before the given 1-based retry
    pub fn next_delay(&mut self, attempt: u32) -> Duration {
        match self {
            Delay::Function(delay) => delay(attempt),
            Delay::Backoff(backoff) => {
                let max = backoff.max_interval;
                backoff.next_backoff().unwrap_or(max)
            }
        }
    }
}

impl From<ExponentialBackoff> for Delay {
    fn from(backoff: ExponentialBackoff) -> Self {
        Delay::Backoff(backoff)
    }
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delay::Function(_) => f.write_str("Function"),
            Delay::Backoff(backoff) => f
                .debug_struct("Backoff")
                .field("initial_interval", &backoff.initial_interval)
                .field("multiplier", &backoff.multiplier)
                .field("max_interval", &backoff.max_interval)
                .finish(),
        }
    }
}

/// Build the delay described by a retry config section
pub fn from_config(config: &RetryConfig) -> Delay {
    let initial = config.initial_backoff();
    match config.backoff {
        BackoffKind::Constant => Delay::function(constant(initial)),
        BackoffKind::Linear => {
            let max = config.max_backoff();
            let step = linear(initial);
            Delay::function(move |attempt| step(attempt).min(max))
        }
        BackoffKind::Exponential => Delay::Backoff(exponential_backoff(
            initial,
            config.backoff_multiplier,
            config.max_backoff(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(delay: impl Fn(u32) -> Duration, n: u32) -> Vec<u64> {
        (1..=n).map(|attempt| delay(attempt).as_secs()).collect()
    }

    #[test]
    fn test_exponential_powers_of_base() {
        assert_eq!(series(exponential(2.0), 4), vec![2, 4, 8, 16]);
    }

    #[test]
    fn test_linear_matches_two_seconds_per_attempt() {
        assert_eq!(series(linear(Duration::from_secs(2)), 3), vec![2, 4, 6]);
    }

    #[test]
    fn test_constant() {
        assert_eq!(series(constant(Duration::from_secs(5)), 3), vec![5, 5, 5]);
    }

    fn assert_jittered(wait: Duration, interval_ms: u64) {
        let low = Duration::from_millis(interval_ms / 2);
        let high = Duration::from_millis(interval_ms * 3 / 2 + 1);
        assert!(
            wait >= low && wait <= high,
            "{:?} outside {:?}..={:?}",
            wait,
            low,
            high
        );
    }

    #[test]
    fn test_exponential_backoff_grows_and_is_capped() {
        let delay = Delay::from(exponential_backoff(
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(500),
        ));
        let mut schedule = delay.schedule();

        for (attempt, interval_ms) in [(1, 100), (2, 200), (3, 400), (4, 500), (5, 500)] {
            assert_jittered(schedule.next_delay(attempt), interval_ms);
        }
    }

    #[test]
    fn test_exponential_backoff_is_randomized() {
        let delay = from_config(&RetryConfig::default());
        let draws: Vec<Vec<Duration>> = (0..5)
            .map(|_| {
                let mut schedule = delay.schedule();
                (1..=4).map(|attempt| schedule.next_delay(attempt)).collect()
            })
            .collect();

        assert!(draws.iter().any(|draw| draw != &draws[0]));
    }

    #[test]
    fn test_each_schedule_starts_from_initial_interval() {
        let delay = from_config(&RetryConfig::default());
        let mut first = delay.schedule();
        for attempt in 1..=6 {
            first.next_delay(attempt);
        }

        let mut second = delay.schedule();
        assert_jittered(second.next_delay(1), 100);
    }

    #[test]
    fn test_huge_exponent_saturates() {
        assert_eq!(exponential(2.0)(5000), Duration::MAX);
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            backoff: BackoffKind::Linear,
            initial_backoff_ms: 2000,
            max_backoff_ms: 5000,
            ..Default::default()
        };
        let mut delay = from_config(&config).schedule();
        assert_eq!(delay.next_delay(1), Duration::from_secs(2));
        assert_eq!(delay.next_delay(2), Duration::from_secs(4));
        assert_eq!(delay.next_delay(3), Duration::from_secs(5));
    }
}
