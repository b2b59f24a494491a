#![forbid(unsafe_code)]

//! Observer callbacks.
//!
//! A [`Callback`] is a shared, identity-carrying handle around a closure
//! taking the aggregated [`Event`]. Registering the same handle under several
//! event types still yields a single delivery per dispatch round.
//!
//! The [`legacy`] module adapts the older `(value, sender)` convention to
//! this single canonical signature.

use std::fmt;
use std::rc::Rc;

use crate::error::ObserverError;
use crate::event::Event;
use crate::id::CallbackId;

/// Result returned by observer callbacks.
pub type ObserverResult = Result<(), ObserverError>;

type CallbackFn = dyn Fn(&Event) -> ObserverResult;

/// Shared observer callback with a stable identity.
///
/// Cloning yields a handle to the **same** callback (same [`CallbackId`]).
#[derive(Clone)]
pub struct Callback {
    id: CallbackId,
    func: Rc<CallbackFn>,
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("id", &self.id).finish()
    }
}

impl Callback {
    /// Wrap a fallible callback.
    pub fn new(func: impl Fn(&Event) -> ObserverResult + 'static) -> Self {
        Self {
            id: CallbackId::next(),
            func: Rc::new(func),
        }
    }

    /// Wrap a callback that cannot fail.
    pub fn from_fn(func: impl Fn(&Event) + 'static) -> Self {
        Self::new(move |event| {
            func(event);
            Ok(())
        })
    }

    #[must_use]
    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// Invoke the callback directly.
    ///
    /// # Errors
    ///
    /// Returns whatever the wrapped closure returns.
    pub fn call(&self, event: &Event) -> ObserverResult {
        (self.func)(event)
    }
}

pub mod legacy {
    //! Compatibility layer for observers written against the per-source
    //! `(new_value, sender)` convention.
    //!
    //! The adapter fans the delivered event, already narrowed to the
    //! callback's registrations, out into one call per `(type, source)`
    //! fact whose payload is a `V`. Facts with a different
    //! payload type, or none, are skipped.

    use std::any::Any;

    use super::Callback;
    use crate::id::SourceId;

    /// Build a [`Callback`] that calls `func(value, sender)` per fact.
    pub fn value_sender<V: Any>(func: impl Fn(&V, SourceId) + 'static) -> Callback {
        Callback::from_fn(move |event| {
            for sources in event.sources_and_values_by_type().values() {
                for (sender, value) in sources {
                    if let Some(v) = value.as_ref().and_then(|v| v.downcast_ref::<V>()) {
                        func(v, *sender);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SourceId;
    use std::cell::RefCell;

    #[test]
    fn clones_share_identity() {
        let cb = Callback::from_fn(|_| {});
        let clone = cb.clone();
        assert_eq!(cb.id(), clone.id());
        assert_ne!(cb.id(), Callback::from_fn(|_| {}).id());
    }

    #[test]
    fn legacy_adapter_fans_out_per_source() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let cb = legacy::value_sender::<i32>(move |v, sender| sink.borrow_mut().push((*v, sender)));

        let (a, b) = (SourceId::next(), SourceId::next());
        let mut event = Event::new();
        event.add_source("priority", a, Some(Rc::new(3_i32)));
        event.add_source("priority", b, Some(Rc::new(7_i32)));
        event.add_source("subject", b, Some(Rc::new("text")));
        cb.call(&event).unwrap();

        assert_eq!(*seen.borrow(), vec![(3, a), (7, b)]);
    }
}
