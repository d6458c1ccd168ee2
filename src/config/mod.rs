use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{ResilienceError, Result};
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for the demo pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Retry policy settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker settings
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-attempt timeout in seconds, no timeout layer when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Demo client settings
    #[serde(default)]
    pub demo: DemoConfig,
}

/// What the demo client calls and how often
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Base URL of the values API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Id requested from `/api/values/{id}`
    #[serde(default = "default_id")]
    pub id: i64,

    /// Number of top-level calls, independent of the retry budget
    #[serde(default = "default_calls")]
    pub calls: u32,

    /// Request timeout of the HTTP client in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_id() -> i64 {
    5
}

fn default_calls() -> u32 {
    4
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            id: default_id(),
            calls: default_calls(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl DemoConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ResilienceConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ResilienceError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ResilienceError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Per-attempt timeout, if configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.retry.backoff_multiplier < 1.0 || !self.retry.backoff_multiplier.is_finite() {
            return Err(ResilienceError::Config(format!(
                "Backoff multiplier must be at least 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ResilienceError::Config(
                "Initial backoff cannot exceed max backoff".to_string(),
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ResilienceError::Config(
                "Circuit breaker failure threshold must be greater than 0".to_string(),
            ));
        }

        if self.timeout_secs == Some(0) {
            return Err(ResilienceError::Config(
                "Timeout must be greater than 0 seconds".to_string(),
            ));
        }

        if !self.demo.base_url.starts_with("http://") && !self.demo.base_url.starts_with("https://")
        {
            return Err(ResilienceError::Config(format!(
                "Base URL must start with http:// or https://: {}",
                self.demo.base_url
            )));
        }

        if self.demo.calls == 0 {
            return Err(ResilienceError::Config(
                "Demo must make at least one call".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffKind;
    use std::io::Write;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
retry:
  max_retries: 5
  backoff: linear
  initial_backoff_ms: 2000
  max_backoff_ms: 60000

circuit_breaker:
  failure_threshold: 2
  break_duration_secs: 30

timeout_secs: 10

demo:
  base_url: "http://127.0.0.1:5000"
  id: 42
  calls: 3
"#;

        let config = ResilienceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.backoff, BackoffKind::Linear);
        assert_eq!(config.retry.initial_backoff_ms, 2000);
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.break_duration(), Duration::from_secs(30));
        assert_eq!(config.timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.demo.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.demo.id, 42);
        assert_eq!(config.demo.calls, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = ResilienceConfig::from_yaml("{}").unwrap();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff, BackoffKind::Exponential);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.timeout(), None);
        assert_eq!(config.demo.base_url, "http://localhost:5000");
        assert_eq!(config.demo.calls, 4);
        assert_eq!(config.demo.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_yaml() {
        let result = ResilienceConfig::from_yaml("retry: [not, a, map]");
        assert!(matches!(result, Err(ResilienceError::Config(_))));
    }

    #[test]
    fn test_validate_zero_threshold() {
        let mut config = ResilienceConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_multiplier() {
        let mut config = ResilienceConfig::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let mut config = ResilienceConfig::default();
        config.retry.initial_backoff_ms = 20_000;
        config.retry.max_backoff_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_base_url() {
        let mut config = ResilienceConfig::default();
        config.demo.base_url = "localhost:5000".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http://"));
    }

    #[test]
    fn test_validate_zero_calls_and_timeout() {
        let mut config = ResilienceConfig::default();
        config.demo.calls = 0;
        assert!(config.validate().is_err());

        let mut config = ResilienceConfig::default();
        config.timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "circuit_breaker:\n  failure_threshold: 7").unwrap();

        let config = ResilienceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.circuit_breaker.failure_threshold, 7);
    }

    #[test]
    fn test_from_missing_file() {
        let err = ResilienceConfig::from_file("/nonexistent/resilience.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
