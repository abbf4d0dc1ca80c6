use std::time::{Duration, Instant};

use crate::trace::TraceContext;

/// Per-call context threaded explicitly through endpoints and services.
///
/// Carries the propagated bearer token, the active trace and the call
/// deadline. Values are immutable; the `with_*` methods derive a new context.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: Option<String>,
    trace: Option<TraceContext>,
    deadline: Option<Instant>,
}

impl Context {
    /// Empty context with no token, trace or deadline
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }

    /// Set a deadline. A derived context never outlives its parent, so the
    /// earlier of the existing and the new deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Deadline `timeout` from now; an unrepresentable instant leaves the context unbounded
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
