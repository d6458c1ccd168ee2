//! Per-call execution context.
//!
//! A [`Context`] travels through every layer of a policy pipeline. Its keys and
//! data bag exist for diagnostics only; the cancellation token is the one
//! field the engine reacts to.

use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Correlation metadata for a single execution
pub struct Context {
    /// Identifies this particular call
    execution_key: String,
    /// Key of the outermost policy that executed with this context
    policy_key: OnceLock<String>,
    /// Auxiliary data visible to hooks
    data: DashMap<String, Value>,
    /// Caller-supplied cancellation signal
    cancellation: CancellationToken,
}

impl Context {
    /// Create a context with a generated execution key
    pub fn new() -> Self {
        Self::with_key(Uuid::new_v4().to_string())
    }

    /// Create a context with a caller-chosen execution key
    pub fn with_key(execution_key: impl Into<String>) -> Self {
        Self {
            execution_key: execution_key.into(),
            policy_key: OnceLock::new(),
            data: DashMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token owned by the caller
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Seed the data bag
    pub fn with_data(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn execution_key(&self) -> &str {
        &self.execution_key
    }

    /// Key of the outermost policy that ran with this context, if any ran yet
    pub fn policy_key(&self) -> Option<&str> {
        self.policy_key.get().map(String::as_str)
    }

    /// Record the executing policy's key. Only the first call has an effect,
    /// so inside a wrap the context reports the wrap's key.
    pub(crate) fn enter(&self, policy_key: &str) {
        let _ = self.policy_key.set(policy_key.to_string());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, value)| value)
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("execution_key", &self.execution_key)
            .field("policy_key", &self.policy_key.get())
            .field("data_len", &self.data.len())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}
