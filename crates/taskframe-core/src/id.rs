#![forbid(unsafe_code)]

//! Identity handles for event sources and observer callbacks.
//!
//! Sources are compared by identity, never by value: two collections holding
//! the same items are still two different sources. Every observable thing
//! (collection, tree, tree node, owner, view) allocates one [`SourceId`] at
//! construction and reports every fact under it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SOURCE: AtomicU64 = AtomicU64::new(1);
static NEXT_CALLBACK: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a fresh identity.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SOURCE.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Source({})", self.0)
    }
}

/// Identity of a registered callback.
///
/// The same callback may be registered under many event types; the
/// publisher uses this id to deliver each event to it at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackId(u64);

impl CallbackId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CALLBACK.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ids_are_unique_and_increasing() {
        let a = SourceId::next();
        let b = SourceId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn display() {
        let id = SourceId::next();
        assert_eq!(id.to_string(), format!("Source({})", id.raw()));
    }
}
