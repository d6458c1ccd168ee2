use crate::error::PolicyError;
use std::fmt;
use std::sync::Arc;

/// Decides which failures a policy handles.
///
/// The predicate sees the operation's own error, also when it is wrapped in
/// `RetriesExhausted` by an inner retry layer. Timeouts and broken circuits are
/// opt-in; cancellation is never handled.
pub struct Classifier<E> {
    predicate: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    timeouts: bool,
    broken_circuit: bool,
}

impl<E> Classifier<E> {
    /// Handle operation errors matching `predicate`
    pub fn new<P>(predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            timeouts: false,
            broken_circuit: false,
        }
    }

    /// Handle every operation error
    pub fn all() -> Self {
        Self::new(|_| true)
    }

    pub fn with_timeouts(mut self, handle: bool) -> Self {
        self.timeouts = handle;
        self
    }

    pub fn with_broken_circuit(mut self, handle: bool) -> Self {
        self.broken_circuit = handle;
        self
    }

    pub(crate) fn set_predicate(&mut self, predicate: Arc<dyn Fn(&E) -> bool + Send + Sync>) {
        self.predicate = predicate;
    }

    pub fn matches(&self, error: &PolicyError<E>) -> bool {
        match error {
            PolicyError::Inner(e) => (self.predicate)(e),
            PolicyError::RetriesExhausted { last, .. } => self.matches(last),
            PolicyError::TimedOut { .. } => self.timeouts,
            PolicyError::CircuitBroken { .. } => self.broken_circuit,
            PolicyError::Cancelled => false,
        }
    }
}

impl<E> Clone for Classifier<E> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            timeouts: self.timeouts,
            broken_circuit: self.broken_circuit,
        }
    }
}

impl<E> Default for Classifier<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E> fmt::Debug for Classifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("predicate", &"<fn>")
            .field("timeouts", &self.timeouts)
            .field("broken_circuit", &self.broken_circuit)
            .finish()
    }
}
