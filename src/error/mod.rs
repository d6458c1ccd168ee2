use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for crate-level operations (config, demo client, API)
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Crate-level error types
#[derive(Error, Debug)]
pub enum ResilienceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected status code: {status}")]
    UnexpectedStatus { status: u16 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResilienceError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResilienceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ResilienceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ResilienceError::Http(_) => StatusCode::BAD_GATEWAY,
            ResilienceError::UnexpectedStatus { .. } => StatusCode::BAD_GATEWAY,
            ResilienceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ResilienceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a failed remote call is worth repeating.
    ///
    /// Connection-level failures, server errors, 408 and 429 are transient;
    /// any other client error is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ResilienceError::Http(_) => true,
            ResilienceError::UnexpectedStatus { status } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ResilienceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ResilienceError::UnexpectedStatus {
                status: status.as_u16(),
            },
            None => ResilienceError::Http(err.to_string()),
        }
    }
}

impl IntoResponse for ResilienceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            ResilienceError::InvalidArgument(message) => message,
            other => other.to_string(),
        };

        (status, body).into_response()
    }
}

/// Outcome of a failed policy execution.
///
/// `Inner` carries the operation's own error untouched; every other variant
/// is produced by a policy layer.
#[derive(Debug)]
pub enum PolicyError<E> {
    /// The operation failed and no policy absorbed the error
    Inner(E),
    /// A retry policy spent its budget on matched failures
    RetriesExhausted {
        attempts: u32,
        last: Box<PolicyError<E>>,
    },
    /// A circuit breaker rejected the call without running the operation.
    /// `retry_after` is `None` while the circuit is manually isolated.
    CircuitBroken {
        policy_key: String,
        retry_after: Option<Duration>,
    },
    /// A timeout policy gave up waiting for the operation
    TimedOut {
        policy_key: String,
        timeout: Duration,
    },
    /// The caller cancelled the execution
    Cancelled,
}

impl<E> PolicyError<E> {
    /// The operation error underneath any retry tagging, if there is one.
    pub fn fault(&self) -> Option<&E> {
        match self {
            PolicyError::Inner(e) => Some(e),
            PolicyError::RetriesExhausted { last, .. } => last.fault(),
            _ => None,
        }
    }

    /// Consume the error and return the underlying operation error.
    pub fn into_fault(self) -> Option<E> {
        match self {
            PolicyError::Inner(e) => Some(e),
            PolicyError::RetriesExhausted { last, .. } => (*last).into_fault(),
            _ => None,
        }
    }

    pub fn is_circuit_broken(&self) -> bool {
        matches!(self, PolicyError::CircuitBroken { .. })
    }

    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, PolicyError::RetriesExhausted { .. })
    }

    pub fn is_timed_out(&self) -> bool {
        match self {
            PolicyError::TimedOut { .. } => true,
            PolicyError::RetriesExhausted { last, .. } => last.is_timed_out(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PolicyError::Cancelled)
    }

    /// Tag as retries-exhausted. An inner exhaustion is unwrapped first so
    /// nested retry layers report a single level.
    pub(crate) fn exhausted(self, attempts: u32) -> Self {
        let last = match self {
            PolicyError::RetriesExhausted { last, .. } => last,
            other => Box::new(other),
        };
        PolicyError::RetriesExhausted { attempts, last }
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyError::Inner(_) => "inner",
            PolicyError::RetriesExhausted { .. } => "retries_exhausted",
            PolicyError::CircuitBroken { .. } => "circuit_broken",
            PolicyError::TimedOut { .. } => "timed_out",
            PolicyError::Cancelled => "cancelled",
        }
    }
}

impl<E: fmt::Display> fmt::Display for PolicyError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::Inner(e) => write!(f, "{}", e),
            PolicyError::RetriesExhausted { attempts, last } => {
                write!(f, "Retries exhausted after {} attempts: {}", attempts, last)
            }
            PolicyError::CircuitBroken {
                policy_key,
                retry_after: Some(remaining),
            } => write!(
                f,
                "Circuit broken for {}, retry after {:?}",
                policy_key, remaining
            ),
            PolicyError::CircuitBroken {
                policy_key,
                retry_after: None,
            } => write!(f, "Circuit isolated for {}", policy_key),
            PolicyError::TimedOut {
                policy_key,
                timeout,
            } => write!(f, "Timed out after {:?} in {}", timeout, policy_key),
            PolicyError::Cancelled => write!(f, "Execution cancelled"),
        }
    }
}

impl<E> std::error::Error for PolicyError<E>
where
    E: fmt::Debug + fmt::Display + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PolicyError::RetriesExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}
