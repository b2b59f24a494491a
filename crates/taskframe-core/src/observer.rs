#![forbid(unsafe_code)]

//! Per-object registration tracking.
//!
//! An [`Observer`] is embedded in any object that subscribes to the
//! [`Publisher`]. It remembers which callbacks the object registered and
//! removes all of them when the object is torn down, so the publisher never
//! keeps a callback alive on behalf of a dead owner.

use std::cell::RefCell;
use std::fmt;

use crate::callback::Callback;
use crate::error::Result;
use crate::event::EventType;
use crate::id::{CallbackId, SourceId};
use crate::publisher::Publisher;

/// Registration tracker that unregisters on drop.
pub struct Observer {
    publisher: Publisher,
    callbacks: RefCell<Vec<CallbackId>>,
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("callbacks", &self.callbacks.borrow())
            .finish()
    }
}

impl Observer {
    #[must_use]
    pub fn new(publisher: &Publisher) -> Self {
        Self {
            publisher: publisher.clone(),
            callbacks: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Register `callback` for `event_type`, optionally filtered to `source`.
    pub fn register(
        &self,
        callback: &Callback,
        event_type: impl Into<EventType>,
        source: Option<SourceId>,
    ) {
        self.publisher
            .register_observer(callback, event_type, source);
        let mut callbacks = self.callbacks.borrow_mut();
        if !callbacks.contains(&callback.id()) {
            callbacks.push(callback.id());
        }
    }

    /// Remove registrations of `callback` (see
    /// [`Publisher::remove_observer`] for the matching rules).
    ///
    /// # Errors
    ///
    /// Returns [`FrameworkError::Subscription`](crate::FrameworkError::Subscription)
    /// when nothing matched.
    pub fn remove(
        &self,
        callback: &Callback,
        event_type: Option<&str>,
        source: Option<SourceId>,
    ) -> Result<usize> {
        let removed = self
            .publisher
            .remove_observer(callback.id(), event_type, source)?;
        if !self.publisher.is_registered(callback.id()) {
            self.callbacks.borrow_mut().retain(|id| *id != callback.id());
        }
        Ok(removed)
    }

    /// Remove every registration this observer made.
    pub fn remove_all(&self) {
        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        for id in callbacks {
            // Already gone if the publisher was cleared.
            let _ = self.publisher.remove_observer(id, None, None);
        }
    }

    /// Callbacks currently tracked.
    #[must_use]
    pub fn callbacks(&self) -> Vec<CallbackId> {
        self.callbacks.borrow().clone()
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.remove_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn drop_unregisters() {
        let publisher = Publisher::default();
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let cb = Callback::from_fn(move |_| h.set(h.get() + 1));

        let observer = Observer::new(&publisher);
        observer.register(&cb, "a", None);
        observer.register(&cb, "b", None);
        publisher.notify("a", SourceId::next(), None);
        assert_eq!(hits.get(), 1);

        drop(observer);
        assert!(!publisher.is_registered(cb.id()));
        publisher.notify("a", SourceId::next(), None);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn partial_remove_keeps_tracking() {
        let publisher = Publisher::default();
        let cb = Callback::from_fn(|_| {});
        let observer = Observer::new(&publisher);
        observer.register(&cb, "a", None);
        observer.register(&cb, "b", None);

        assert_eq!(observer.remove(&cb, Some("a"), None), Ok(1));
        assert_eq!(observer.callbacks(), vec![cb.id()]);
        assert_eq!(observer.remove(&cb, None, None), Ok(1));
        assert!(observer.callbacks().is_empty());
    }

    #[test]
    fn remove_all_survives_cleared_publisher() {
        let publisher = Publisher::default();
        let cb = Callback::from_fn(|_| {});
        let observer = Observer::new(&publisher);
        observer.register(&cb, "a", None);
        publisher.clear();
        observer.remove_all();
        assert!(observer.callbacks().is_empty());
    }
}
