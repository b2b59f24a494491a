#![forbid(unsafe_code)]

//! Error taxonomy for the event framework.
//!
//! - [`FrameworkError::InvalidOperation`]: a mutation that would break a
//!   structural invariant (cyclic reparenting, stale node ids). Raised before
//!   any fact is recorded.
//! - [`FrameworkError::Subscription`]: removing a callback that was never
//!   registered. Callers are free to ignore it.
//! - [`DispatchError`]: an observer failed during delivery. Logged and
//!   collected in the [`DispatchReport`](crate::publisher::DispatchReport);
//!   never propagated back to the mutator.

use crate::event::EventType;
use crate::id::CallbackId;

/// Convenience alias for framework results.
pub type Result<T, E = FrameworkError> = std::result::Result<T, E>;

/// Errors raised by framework operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameworkError {
    /// The operation would violate a structural invariant.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// No registration matched the removal request.
    #[error("{callback} is not registered{}", for_type(.event_type))]
    Subscription {
        callback: CallbackId,
        event_type: Option<EventType>,
    },
    /// A tree node id does not refer to a live node.
    #[error("node {0} not found")]
    NodeNotFound(usize),
}

impl FrameworkError {
    /// Shorthand for [`FrameworkError::InvalidOperation`].
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }
}

fn for_type(event_type: &Option<EventType>) -> String {
    event_type
        .as_ref()
        .map(|t| format!(" for {t}"))
        .unwrap_or_default()
}

/// A single failed delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The callback returned an error.
    #[error("{callback} failed handling {event_type}: {message}")]
    CallbackFailed {
        callback: CallbackId,
        event_type: EventType,
        message: String,
    },
    /// The callback panicked and the panic was contained.
    #[error("{callback} panicked: {message}")]
    CallbackPanicked { callback: CallbackId, message: String },
    /// Observers kept publishing from inside delivery past the configured depth.
    #[error("dispatch depth {depth} exceeded; event dropped")]
    DepthExceeded { depth: usize },
}

/// Error type returned by observer callbacks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ObserverError(pub String);

impl ObserverError {
    #[must_use]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<&str> for ObserverError {
    fn from(msg: &str) -> Self {
        Self(msg.to_string())
    }
}

impl From<String> for ObserverError {
    fn from(msg: String) -> Self {
        Self(msg)
    }
}

impl From<FrameworkError> for ObserverError {
    fn from(err: FrameworkError) -> Self {
        Self(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_error_mentions_type() {
        let err = FrameworkError::Subscription {
            callback: CallbackId::next(),
            event_type: Some(EventType::from("task.added")),
        };
        assert!(err.to_string().contains("task.added"));
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn dispatch_error_display() {
        let err = DispatchError::DepthExceeded { depth: 4 };
        assert!(err.to_string().contains("depth 4"));
    }
}
