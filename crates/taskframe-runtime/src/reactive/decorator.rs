#![forbid(unsafe_code)]

//! Derived collection views that re-publish their base's changes.
//!
//! # Design
//!
//! A view wraps a base [`Collection`] and keeps its own membership in an
//! [`ObservableList`] with its own source and event types. It subscribes to
//! the base's added/removed/changed facts and to any extra *watched* event
//! types (attribute changes such as `"Task.active"`). On each delivery it
//! recomputes its membership from the base and publishes only the
//! difference, so:
//!
//! - an item added to the base but rejected by the filter produces no event
//!   from the view;
//! - an item whose attribute change flips the filter produces a synthetic
//!   added/removed event from the view although the base did not change.
//!
//! Writes through a view (`extend_items`, `remove_items`, `replace_all`)
//! go to the base. Views are [`Collection`]s themselves, so they stack.
//!
//! # Invariants
//!
//! 1. Filtered views keep the base's order.
//! 2. A frozen view ignores base changes; the final `thaw` recomputes.
//! 3. A view holds its subscriptions through an [`Observer`]; dropping the
//!    last handle unregisters them.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use taskframe_core::{Callback, EventType, Observer, Publisher, SourceId};
use tracing::trace;

use super::collection::{Change, Collection, CollectionEventTypes, ObservableList};

type Derive<T> = Rc<dyn Fn(Vec<T>) -> Vec<T>>;

struct ViewState<T> {
    name: String,
    base: Rc<dyn Collection<T>>,
    items: ObservableList<T>,
    derive: RefCell<Derive<T>>,
    sorted_type: Option<EventType>,
    frozen: Cell<usize>,
    observer: Observer,
    callback: Callback,
}

impl<T: Clone + PartialEq + 'static> ViewState<T> {
    fn build(
        base: Rc<dyn Collection<T>>,
        name: &str,
        derive: Derive<T>,
        sorted_type: Option<EventType>,
    ) -> Rc<Self> {
        let publisher = base.publisher().clone();
        let state = Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let callback = Callback::from_fn(move |_| {
                if let Some(state) = weak.upgrade() {
                    state.reset();
                }
            });
            Self {
                name: name.to_string(),
                items: ObservableList::new(
                    &publisher,
                    CollectionEventTypes::for_collection(name, "items"),
                ),
                base,
                derive: RefCell::new(derive),
                sorted_type,
                frozen: Cell::new(0),
                observer: Observer::new(&publisher),
                callback,
            }
        });
        let events = state.base.event_types().clone();
        let source = state.base.source_id();
        for t in [events.added, events.removed, events.changed] {
            state.observer.register(&state.callback, t, Some(source));
        }
        state.reset();
        state
    }

    fn reset(&self) {
        if self.frozen.get() > 0 {
            return;
        }
        let derive = Rc::clone(&self.derive.borrow());
        let wanted = derive(self.base.items());
        let publisher = self.items.publisher().clone();
        let _round = publisher.round();
        let change = self.items.replace_all(wanted);
        if change.reordered {
            if let Some(t) = &self.sorted_type {
                publisher.notify(t.clone(), self.items.source_id(), None);
            }
        }
        if !change.is_empty() {
            trace!(view = %self.name, added = change.added.len(), removed = change.removed.len(), "view reset");
        }
    }

    fn set_derive(&self, derive: Derive<T>) {
        *self.derive.borrow_mut() = derive;
        self.reset();
    }
}

macro_rules! view_common {
    ($view:ident) => {
        impl<T> Clone for $view<T> {
            fn clone(&self) -> Self {
                Self(Rc::clone(&self.0))
            }
        }

        impl<T: fmt::Debug + Clone + PartialEq + 'static> fmt::Debug for $view<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($view))
                    .field("name", &self.0.name)
                    .field("frozen", &self.0.frozen.get())
                    .field("items", &self.0.items.items())
                    .finish()
            }
        }

        impl<T: Clone + PartialEq + 'static> $view<T> {
            /// View name used as the prefix of its event types.
            #[must_use]
            pub fn name(&self) -> &str {
                &self.0.name
            }

            /// Recompute membership also when `event_type` is published by
            /// any source.
            pub fn watch(&self, event_type: impl Into<EventType>) {
                self.0.observer.register(&self.0.callback, event_type, None);
            }

            /// Recompute membership when `source` publishes `event_type`.
            pub fn watch_source(&self, event_type: impl Into<EventType>, source: SourceId) {
                self.0
                    .observer
                    .register(&self.0.callback, event_type, Some(source));
            }

            /// Suspend recomputation. Nested freezes need matching thaws.
            pub fn freeze(&self) {
                self.0.frozen.set(self.0.frozen.get() + 1);
            }

            /// Undo one `freeze`; the last one recomputes membership.
            pub fn thaw(&self) {
                let frozen = self.0.frozen.get().saturating_sub(1);
                self.0.frozen.set(frozen);
                if frozen == 0 {
                    self.0.reset();
                }
            }

            #[must_use]
            pub fn is_frozen(&self) -> bool {
                self.0.frozen.get() > 0
            }

            /// Recompute membership from the base now.
            pub fn reset(&self) {
                self.0.reset();
            }

            /// Stop following the base and watched events.
            pub fn detach(&self) {
                self.0.observer.remove_all();
            }

            /// The undecorated collection at the bottom of the view stack.
            #[must_use]
            pub fn root(&self) -> Rc<dyn Collection<T>> {
                super::collection::root_collection(Rc::clone(&self.0.base))
            }

            /// Type-erased handle for stacking another view on this one.
            #[must_use]
            pub fn as_collection(&self) -> Rc<dyn Collection<T>> {
                Rc::new(self.clone())
            }
        }

        impl<T: Clone + PartialEq + 'static> Collection<T> for $view<T> {
            fn source_id(&self) -> SourceId {
                self.0.items.source_id()
            }

            fn event_types(&self) -> &CollectionEventTypes {
                self.0.items.event_types()
            }

            fn publisher(&self) -> &Publisher {
                self.0.items.publisher()
            }

            fn items(&self) -> Vec<T> {
                self.0.items.items()
            }

            fn contains(&self, item: &T) -> bool {
                self.0.items.contains(item)
            }

            fn len(&self) -> usize {
                self.0.items.len()
            }

            fn extend_items(&self, items: Vec<T>) -> Vec<T> {
                self.0.base.extend_items(items)
            }

            fn remove_items(&self, items: &[T]) -> Vec<T> {
                self.0.base.remove_items(items)
            }

            fn replace_all(&self, items: Vec<T>) -> Change<T> {
                self.0.base.replace_all(items)
            }

            fn base(&self) -> Option<Rc<dyn Collection<T>>> {
                Some(Rc::clone(&self.0.base))
            }
        }
    };
}

// ============================================================================
// FilteredView
// ============================================================================

/// View showing the base items that satisfy a predicate.
pub struct FilteredView<T>(Rc<ViewState<T>>);

view_common!(FilteredView);

impl<T: Clone + PartialEq + 'static> FilteredView<T> {
    /// Filter `base`, publishing as `"<name>.itemsAdded"` etc.
    pub fn new(
        base: impl Collection<T> + 'static,
        name: &str,
        predicate: impl Fn(&T) -> bool + 'static,
    ) -> Self {
        Self::over(Rc::new(base), name, predicate)
    }

    /// Filter an already type-erased base (e.g. another view).
    pub fn over(
        base: Rc<dyn Collection<T>>,
        name: &str,
        predicate: impl Fn(&T) -> bool + 'static,
    ) -> Self {
        Self(ViewState::build(base, name, filter_derive(predicate), None))
    }

    /// Replace the predicate and recompute.
    pub fn set_predicate(&self, predicate: impl Fn(&T) -> bool + 'static) {
        self.0.set_derive(filter_derive(predicate));
    }
}

fn filter_derive<T: 'static>(predicate: impl Fn(&T) -> bool + 'static) -> Derive<T> {
    Rc::new(move |items: Vec<T>| items.into_iter().filter(|i| predicate(i)).collect())
}

// ============================================================================
// SortedView
// ============================================================================

/// View holding the base items in comparator order.
///
/// Publishes `"<name>.sorted"` when a recomputation changes the relative
/// order of items it already held.
pub struct SortedView<T>(Rc<ViewState<T>>);

view_common!(SortedView);

impl<T: Clone + PartialEq + 'static> SortedView<T> {
    pub fn new(
        base: impl Collection<T> + 'static,
        name: &str,
        compare: impl Fn(&T, &T) -> Ordering + 'static,
    ) -> Self {
        Self::over(Rc::new(base), name, compare)
    }

    pub fn over(
        base: Rc<dyn Collection<T>>,
        name: &str,
        compare: impl Fn(&T, &T) -> Ordering + 'static,
    ) -> Self {
        let sorted = EventType::from(format!("{name}.sorted"));
        Self(ViewState::build(base, name, sort_derive(compare), Some(sorted)))
    }

    /// Replace the comparator and re-sort.
    pub fn set_comparator(&self, compare: impl Fn(&T, &T) -> Ordering + 'static) {
        self.0.set_derive(sort_derive(compare));
    }

    #[must_use]
    pub fn sorted_event_type(&self) -> EventType {
        EventType::from(format!("{}.sorted", self.0.name))
    }
}

fn sort_derive<T: 'static>(compare: impl Fn(&T, &T) -> Ordering + 'static) -> Derive<T> {
    Rc::new(move |mut items: Vec<T>| {
        items.sort_by(|a, b| compare(a, b));
        items
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::attribute::Attribute;
    use pretty_assertions::assert_eq;
    use taskframe_core::Event;

    fn numbers(publisher: &Publisher) -> ObservableList<i32> {
        ObservableList::new(publisher, CollectionEventTypes::for_collection("Numbers", "values"))
    }

    fn record(publisher: &Publisher, types: &[EventType]) -> (Callback, Rc<RefCell<Vec<Event>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let cb = Callback::from_fn(move |e| sink.borrow_mut().push(e.clone()));
        for t in types {
            publisher.register_observer(&cb, t.clone(), None);
        }
        (cb, log)
    }

    #[test]
    fn filter_tracks_base() {
        let publisher = Publisher::default();
        let base = numbers(&publisher);
        base.extend([1, 2, 3, 4]);
        let evens = FilteredView::new(base.clone(), "Evens", |n: &i32| n % 2 == 0);
        assert_eq!(evens.items(), vec![2, 4]);

        base.extend([6, 7]);
        assert_eq!(evens.items(), vec![2, 4, 6]);
        base.remove(&2);
        assert_eq!(evens.items(), vec![4, 6]);
    }

    #[test]
    fn rejected_item_produces_no_view_event() {
        let publisher = Publisher::default();
        let base = numbers(&publisher);
        let evens = FilteredView::new(base.clone(), "Evens", |n: &i32| n % 2 == 0);
        let (_cb, log) = record(&publisher, &[evens.event_types().added.clone()]);

        base.append(3);
        assert!(log.borrow().is_empty());
        base.append(8);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(
            log.borrow()[0].items::<i32>(evens.source_id(), "Evens.itemsAdded"),
            &[8]
        );
    }

    #[derive(Clone)]
    struct Item {
        id: u32,
        active: Attribute<bool>,
    }

    impl PartialEq for Item {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    #[test]
    fn attribute_change_synthesizes_added_event() {
        let publisher = Publisher::default();
        let base: ObservableList<Item> =
            ObservableList::new(&publisher, CollectionEventTypes::for_collection("Items", "items"));
        let item = Item {
            id: 1,
            active: Attribute::new(&publisher, SourceId::next(), "Item.active", false),
        };
        base.append(item.clone());

        let active = FilteredView::new(base.clone(), "Active", |i: &Item| i.active.get());
        active.watch("Item.active");
        assert!(active.is_empty());
        let (_cb, log) = record(&publisher, &[active.event_types().added.clone()]);

        item.active.set(true);
        assert_eq!(log.borrow().len(), 1);
        let added = log.borrow()[0].items::<Item>(active.source_id(), "Active.itemsAdded").len();
        assert_eq!(added, 1);
        assert_eq!(base.len(), 1, "base membership unchanged");

        item.active.set(false);
        assert!(active.is_empty());
    }

    #[test]
    fn freeze_defers_until_thaw() {
        let publisher = Publisher::default();
        let base = numbers(&publisher);
        let view = FilteredView::new(base.clone(), "All", |_: &i32| true);
        view.freeze();
        base.extend([1, 2]);
        assert!(view.is_empty());
        view.thaw();
        assert_eq!(view.items(), vec![1, 2]);
    }

    #[test]
    fn writes_go_to_base() {
        let publisher = Publisher::default();
        let base = numbers(&publisher);
        let evens = FilteredView::new(base.clone(), "Evens", |n: &i32| n % 2 == 0);
        assert_eq!(evens.extend_items(vec![1, 2]), vec![1, 2]);
        assert_eq!(base.items(), vec![1, 2]);
        assert_eq!(evens.items(), vec![2]);
        evens.remove_items(&[2]);
        assert_eq!(base.items(), vec![1]);
    }

    #[test]
    fn set_predicate_recomputes() {
        let publisher = Publisher::default();
        let base = numbers(&publisher);
        base.extend([1, 2, 3]);
        let view = FilteredView::new(base.clone(), "Small", |n: &i32| *n < 2);
        view.set_predicate(|n: &i32| *n > 1);
        assert_eq!(view.items(), vec![2, 3]);
    }

    #[test]
    fn detach_stops_following() {
        let publisher = Publisher::default();
        let base = numbers(&publisher);
        let view = FilteredView::new(base.clone(), "All", |_: &i32| true);
        view.detach();
        base.append(1);
        assert!(view.is_empty());
    }

    #[test]
    fn dropped_view_unregisters() {
        let publisher = Publisher::default();
        let base = numbers(&publisher);
        let before = publisher.observers(None).len();
        let view = FilteredView::new(base.clone(), "All", |_: &i32| true);
        assert_eq!(publisher.observers(None).len(), before + 1);
        drop(view);
        assert_eq!(publisher.observers(None).len(), before);
    }

    #[test]
    fn sorted_view_orders_and_stacks() {
        let publisher = Publisher::default();
        let base = numbers(&publisher);
        base.extend([5, 1, 4, 2]);
        let evens = FilteredView::new(base.clone(), "Evens", |n: &i32| n % 2 == 0);
        let sorted = SortedView::over(evens.as_collection(), "SortedEvens", |a: &i32, b: &i32| a.cmp(b));
        assert_eq!(sorted.items(), vec![2, 4]);

        base.append(0);
        assert_eq!(sorted.items(), vec![0, 2, 4]);
        assert_eq!(sorted.root().source_id(), base.source_id());
    }

    #[test]
    fn comparator_change_publishes_sorted() {
        let publisher = Publisher::default();
        let base = numbers(&publisher);
        base.extend([3, 1, 2]);
        let sorted = SortedView::new(base.clone(), "ByValue", |a: &i32, b: &i32| a.cmp(b));
        let (_cb, log) = record(&publisher, &[sorted.sorted_event_type()]);

        sorted.set_comparator(|a: &i32, b: &i32| b.cmp(a));
        assert_eq!(sorted.items(), vec![3, 2, 1]);
        assert_eq!(log.borrow().len(), 1);

        base.append(0);
        assert_eq!(sorted.items(), vec![3, 2, 1, 0]);
        assert_eq!(log.borrow().len(), 1, "insertion is not a reorder");
    }
}
