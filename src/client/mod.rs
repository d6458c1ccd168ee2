//! HTTP client for the values API used by the demo binary.

use crate::circuit_breaker::CircuitBreakerPolicy;
use crate::config::ResilienceConfig;
use crate::error::{ResilienceError, Result};
use crate::retry::RetryPolicy;
use crate::timeout::TimeoutPolicy;
use crate::wrap::PolicyWrap;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::debug;

pub const RETRY_POLICY_KEY: &str = "HttpRetryPolicy";
pub const BREAKER_POLICY_KEY: &str = "ValuesApiBreaker";
pub const TIMEOUT_POLICY_KEY: &str = "ValuesApiTimeout";

/// Calls `GET {base_url}/api/values/{id}` and returns the body as text
#[derive(Debug, Clone)]
pub struct ValuesClient {
    client: reqwest::Client,
    base_url: String,
}

impl ValuesClient {
    /// Create a client with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResilienceError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one value. Non-success statuses become
    /// [`ResilienceError::UnexpectedStatus`].
    pub async fn get_value(&self, id: i64) -> Result<String> {
        let url = format!("{}/api/values/{}", self.base_url, id);
        debug!(url = %url, "Calling values API");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/plain")
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }
}

/// Retry outermost, then the breaker, then the optional per-attempt timeout.
///
/// Only transient HTTP failures and timeouts are retried or counted.
pub fn build_pipeline(config: &ResilienceConfig) -> PolicyWrap<String, ResilienceError> {
    let retry = RetryPolicy::from_config(&config.retry)
        .policy_key(RETRY_POLICY_KEY)
        .handle(ResilienceError::is_transient)
        .handle_timeouts()
        .build();

    let breaker = CircuitBreakerPolicy::from_config(&config.circuit_breaker)
        .policy_key(BREAKER_POLICY_KEY)
        .handle(ResilienceError::is_transient)
        .handle_timeouts()
        .build();

    let builder = PolicyWrap::builder()
        .policy_key("ValuesApiPipeline")
        .wrap(retry)
        .wrap(breaker);

    match config.timeout() {
        Some(timeout) => builder
            .wrap(TimeoutPolicy::new(timeout).with_policy_key(TIMEOUT_POLICY_KEY))
            .build(),
        None => builder.build(),
    }
}
