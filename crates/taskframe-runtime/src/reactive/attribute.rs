#![forbid(unsafe_code)]

//! Owner-sourced attribute with change notification and version tracking.
//!
//! # Design
//!
//! [`Attribute<T>`] wraps a value of type `T` in shared, reference-counted
//! storage (`Rc<RefCell<..>>`). When the value changes (determined by
//! `PartialEq`), the attribute reports `(event_type, owner, new value)` to the
//! [`Publisher`]. The fact is attributed to the owning object, not to the
//! attribute, so observers subscribe to e.g. `"Task.active"` filtered by the
//! task's [`SourceId`].
//!
//! # Invariants
//!
//! 1. `version` increments by exactly 1 on each value-changing mutation.
//! 2. `set(v)` where `v == current` is a no-op: no version bump, no fact.
//! 3. The borrow is released before publishing, so observers may read the
//!    attribute from inside their callback.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use taskframe_core::{EventType, Publisher, SourceId};

struct AttributeInner<T> {
    value: T,
    version: u64,
}

/// A shared, version-tracked value owned by a domain object.
///
/// Cloning creates a new handle to the **same** value.
pub struct Attribute<T> {
    inner: Rc<RefCell<AttributeInner<T>>>,
    publisher: Publisher,
    owner: SourceId,
    event_type: EventType,
}

impl<T> Clone for Attribute<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            publisher: self.publisher.clone(),
            owner: self.owner,
            event_type: self.event_type.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Attribute")
            .field("event_type", &self.event_type)
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Attribute<T> {
    /// Create an attribute of `owner` reporting changes as `event_type`.
    #[must_use]
    pub fn new(
        publisher: &Publisher,
        owner: SourceId,
        event_type: impl Into<EventType>,
        value: T,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(AttributeInner { value, version: 0 })),
            publisher: publisher.clone(),
            owner,
            event_type: event_type.into(),
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference without cloning.
    ///
    /// # Panics
    ///
    /// If `f` sets or updates this attribute; the value stays borrowed
    /// while `f` runs.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Set a new value. Returns `true` and publishes if it differs from the
    /// current one.
    pub fn set(&self, value: T) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return false;
            }
            inner.value = value;
            inner.version += 1;
        }
        self.publish();
        true
    }

    /// Modify a copy of the value and store it. Publishes only if the
    /// result differs from the current value. `f` runs without a borrow
    /// held, so it may read this attribute.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut value = self.get();
        f(&mut value);
        self.set(value)
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    #[must_use]
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    #[must_use]
    pub fn owner(&self) -> SourceId {
        self.owner
    }

    fn publish(&self) {
        let value = self.get();
        self.publisher
            .notify(self.event_type.clone(), self.owner, Some(Rc::new(value)));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use taskframe_core::Callback;

    fn attr<T: Clone + PartialEq + 'static>(publisher: &Publisher, value: T) -> Attribute<T> {
        Attribute::new(publisher, SourceId::next(), "Task.subject", value)
    }

    #[test]
    fn get_set_basic() {
        let publisher = Publisher::default();
        let a = attr(&publisher, 42);
        assert_eq!(a.get(), 42);
        assert_eq!(a.version(), 0);

        assert!(a.set(99));
        assert_eq!(a.get(), 99);
        assert_eq!(a.version(), 1);
    }

    #[test]
    fn no_change_no_version_bump() {
        let publisher = Publisher::default();
        let a = attr(&publisher, 42);
        assert!(!a.set(42));
        assert_eq!(a.version(), 0);
    }

    #[test]
    fn update_mutates_in_place() {
        let publisher = Publisher::default();
        let a = attr(&publisher, vec![1, 2, 3]);
        assert!(a.update(|v| v.push(4)));
        assert_eq!(a.get(), vec![1, 2, 3, 4]);
        assert!(!a.update(|_| {}));
        assert_eq!(a.version(), 1);
    }

    #[test]
    fn change_is_reported_under_owner() {
        let publisher = Publisher::default();
        let a = attr(&publisher, String::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let owner = a.owner();
        let cb = Callback::from_fn(move |e| {
            let v = e.value::<String>(owner, "Task.subject").cloned();
            sink.borrow_mut().push(v);
        });
        publisher.register_observer(&cb, "Task.subject", Some(owner));

        a.set("hello".to_string());
        a.set("hello".to_string());
        a.set("world".to_string());
        assert_eq!(
            *seen.borrow(),
            vec![Some("hello".to_string()), Some("world".to_string())]
        );
    }

    #[test]
    fn observer_can_read_attribute() {
        let publisher = Publisher::default();
        let a = attr(&publisher, 0);
        let last = Rc::new(Cell::new(0));
        let (reader, l) = (a.clone(), Rc::clone(&last));
        let cb = Callback::from_fn(move |_| l.set(reader.get()));
        publisher.register_observer(&cb, "Task.subject", None);

        a.set(7);
        assert_eq!(last.get(), 7);
    }

    #[test]
    fn update_closure_may_read_the_attribute() {
        let publisher = Publisher::default();
        let a = attr(&publisher, 2);
        let reader = a.clone();
        assert!(a.update(|v| *v += reader.get()));
        assert_eq!(a.get(), 4);
        assert_eq!(a.version(), 1);
    }

    #[test]
    fn clone_shares_state() {
        let publisher = Publisher::default();
        let a = attr(&publisher, 0);
        let b = a.clone();
        a.set(5);
        assert_eq!(b.get(), 5);
        assert_eq!(b.version(), 1);
    }

    #[test]
    fn debug_format() {
        let publisher = Publisher::default();
        let dbg = format!("{:?}", attr(&publisher, 42));
        assert!(dbg.contains("Attribute"));
        assert!(dbg.contains("42"));
        assert!(dbg.contains("version"));
    }
}
