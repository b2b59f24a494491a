#![forbid(unsafe_code)]

//! Observable collections that publish membership changes.
//!
//! # Design
//!
//! [`ObservableCollection<T, S>`] wraps a backing [`Store`] in shared,
//! reference-counted storage and reports every membership change to the
//! [`Publisher`]. Two stores are provided:
//!
//! - [`ListStore`]: insertion-ordered, duplicate-free ([`ObservableList`]).
//! - [`SetStore`]: ordered by `T: Ord` ([`ObservableSet`]).
//!
//! # Invariants
//!
//! 1. Each call computes the actual delta first: adding present items or
//!    removing absent ones contributes nothing.
//! 2. A call with a non-empty delta publishes exactly one round holding the
//!    added/removed fact (value: `Vec<T>` of the delta) and the changed
//!    fact (no value), all under the collection's source.
//! 3. A call with an empty delta publishes nothing.
//! 4. A list `replace_all` that only changes order publishes the changed
//!    fact alone.
//!
//! # Failure Modes
//!
//! - **Re-entrant mutation from a borrow**: the store borrow is released
//!   before publishing, so observers may read or mutate the collection.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use taskframe_core::{EventType, Publisher, SourceId};

/// Canonical event type names for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEventTypes {
    pub added: EventType,
    pub removed: EventType,
    pub changed: EventType,
}

impl CollectionEventTypes {
    /// `"<Owner>.<name>Added"`, `"<Owner>.<name>Removed"`,
    /// `"<Owner>.<name>Changed"`.
    #[must_use]
    pub fn for_collection(owner: &str, name: &str) -> Self {
        Self {
            added: EventType::from(format!("{owner}.{name}Added")),
            removed: EventType::from(format!("{owner}.{name}Removed")),
            changed: EventType::from(format!("{owner}.{name}Changed")),
        }
    }

    /// Names for an owned type: `"Task.noteAdded"`, `"Task.noteRemoved"`,
    /// `"Task.notesChanged"` for owner `Task`, owned type `Note`.
    #[must_use]
    pub fn for_owned(owner: &str, owned_type: &str) -> Self {
        let owned = lower_first(owned_type);
        Self {
            added: EventType::from(format!("{owner}.{owned}Added")),
            removed: EventType::from(format!("{owner}.{owned}Removed")),
            changed: EventType::from(format!("{owner}.{owned}sChanged")),
        }
    }
}

impl CollectionEventTypes {
    /// Types that signal a membership change: added and removed.
    #[must_use]
    pub fn modification_event_types(&self) -> Vec<EventType> {
        vec![self.added.clone(), self.removed.clone()]
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Membership delta produced by a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
    /// Items present before and after changed relative order.
    pub reordered: bool,
}

impl<T> Default for Change<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            reordered: false,
        }
    }
}

impl<T> Change<T> {
    /// Whether membership changed.
    #[must_use]
    pub fn is_membership_change(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Whether anything observable changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.is_membership_change() && !self.reordered
    }
}

// ============================================================================
// Backing stores
// ============================================================================

/// Backing storage for an observable collection.
pub trait Store<T>: Default {
    fn contains(&self, item: &T) -> bool;
    fn insert(&mut self, item: T);
    fn remove(&mut self, item: &T) -> bool;
    fn to_vec(&self) -> Vec<T>;
    fn len(&self) -> usize;
    /// Replace the whole content. `items` is already duplicate-free.
    fn set_all(&mut self, items: Vec<T>);
}

/// Insertion-ordered, duplicate-free storage.
#[derive(Debug, Clone)]
pub struct ListStore<T>(Vec<T>);

impl<T> Default for ListStore<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T: Clone + PartialEq> Store<T> for ListStore<T> {
    fn contains(&self, item: &T) -> bool {
        self.0.contains(item)
    }

    fn insert(&mut self, item: T) {
        self.0.push(item);
    }

    fn remove(&mut self, item: &T) -> bool {
        match self.0.iter().position(|x| x == item) {
            Some(i) => {
                self.0.remove(i);
                true
            }
            None => false,
        }
    }

    fn to_vec(&self) -> Vec<T> {
        self.0.clone()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn set_all(&mut self, items: Vec<T>) {
        self.0 = items;
    }
}

/// Ordered set storage.
#[derive(Debug, Clone)]
pub struct SetStore<T>(BTreeSet<T>);

impl<T> Default for SetStore<T> {
    fn default() -> Self {
        Self(BTreeSet::new())
    }
}

impl<T: Clone + Ord> Store<T> for SetStore<T> {
    fn contains(&self, item: &T) -> bool {
        self.0.contains(item)
    }

    fn insert(&mut self, item: T) {
        self.0.insert(item);
    }

    fn remove(&mut self, item: &T) -> bool {
        self.0.remove(item)
    }

    fn to_vec(&self) -> Vec<T> {
        self.0.iter().cloned().collect()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn set_all(&mut self, items: Vec<T>) {
        self.0 = items.into_iter().collect();
    }
}

// ============================================================================
// Collection trait
// ============================================================================

/// Common surface of observable collections and the views stacked on them.
pub trait Collection<T> {
    fn source_id(&self) -> SourceId;
    fn event_types(&self) -> &CollectionEventTypes;
    fn publisher(&self) -> &Publisher;
    fn items(&self) -> Vec<T>;
    fn contains(&self, item: &T) -> bool;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add items, returning those actually added.
    fn extend_items(&self, items: Vec<T>) -> Vec<T>;

    /// Remove items, returning those actually removed.
    fn remove_items(&self, items: &[T]) -> Vec<T>;

    /// Replace the content wholesale.
    fn replace_all(&self, items: Vec<T>) -> Change<T>;

    /// The collection this one decorates, if any.
    fn base(&self) -> Option<Rc<dyn Collection<T>>> {
        None
    }
}

/// Follow [`Collection::base`] to the undecorated collection.
pub fn root_collection<T>(collection: Rc<dyn Collection<T>>) -> Rc<dyn Collection<T>> {
    let mut current = collection;
    while let Some(base) = current.base() {
        current = base;
    }
    current
}

// ============================================================================
// ObservableCollection
// ============================================================================

/// A shared collection that publishes its membership changes.
///
/// Cloning creates a new handle to the **same** collection (same source).
pub struct ObservableCollection<T, S> {
    store: Rc<RefCell<S>>,
    publisher: Publisher,
    source: SourceId,
    events: CollectionEventTypes,
    _item: std::marker::PhantomData<fn() -> T>,
}

/// Ordered, duplicate-free observable collection.
pub type ObservableList<T> = ObservableCollection<T, ListStore<T>>;

/// Ordered-set observable collection.
pub type ObservableSet<T> = ObservableCollection<T, SetStore<T>>;

impl<T, S> Clone for ObservableCollection<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
            publisher: self.publisher.clone(),
            source: self.source,
            events: self.events.clone(),
            _item: std::marker::PhantomData,
        }
    }
}

impl<T: fmt::Debug + Clone + PartialEq + 'static, S: Store<T>> fmt::Debug for ObservableCollection<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableCollection")
            .field("source", &self.source)
            .field("events", &self.events.changed)
            .field("items", &self.items())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static, S: Store<T>> ObservableCollection<T, S> {
    /// Create an empty collection with a fresh source identity.
    #[must_use]
    pub fn new(publisher: &Publisher, events: CollectionEventTypes) -> Self {
        Self::with_source(publisher, events, SourceId::next())
    }

    /// Create an empty collection reporting under an existing source, e.g.
    /// the object that owns it.
    #[must_use]
    pub fn with_source(publisher: &Publisher, events: CollectionEventTypes, source: SourceId) -> Self {
        Self {
            store: Rc::new(RefCell::new(S::default())),
            publisher: publisher.clone(),
            source,
            events,
            _item: std::marker::PhantomData,
        }
    }

    #[must_use]
    pub fn source_id(&self) -> SourceId {
        self.source
    }

    #[must_use]
    pub fn event_types(&self) -> &CollectionEventTypes {
        &self.events
    }

    #[must_use]
    pub fn modification_event_types(&self) -> Vec<EventType> {
        self.events.modification_event_types()
    }

    #[must_use]
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Snapshot of the content.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.store.borrow().to_vec()
    }

    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.store.borrow().contains(item)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add one item. Returns `false` if it was already present.
    pub fn append(&self, item: T) -> bool {
        !self.extend([item]).is_empty()
    }

    /// Add items not yet present, returning them.
    pub fn extend(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let added = {
            let mut store = self.store.borrow_mut();
            let mut added = Vec::new();
            for item in items {
                if !store.contains(&item) {
                    store.insert(item.clone());
                    added.push(item);
                }
            }
            added
        };
        if !added.is_empty() {
            self.publish(&added, &[]);
        }
        added
    }

    /// Remove one item. Returns `false` if it was absent.
    pub fn remove(&self, item: &T) -> bool {
        !self.remove_items(std::slice::from_ref(item)).is_empty()
    }

    /// Remove the present items among `items`, returning them.
    pub fn remove_items(&self, items: &[T]) -> Vec<T> {
        let removed = {
            let mut store = self.store.borrow_mut();
            items
                .iter()
                .filter(|item| store.remove(item))
                .cloned()
                .collect::<Vec<_>>()
        };
        if !removed.is_empty() {
            self.publish(&[], &removed);
        }
        removed
    }

    /// Remove everything, returning what was held.
    pub fn remove_all(&self) -> Vec<T> {
        let removed = {
            let mut store = self.store.borrow_mut();
            let removed = store.to_vec();
            store.set_all(Vec::new());
            removed
        };
        if !removed.is_empty() {
            self.publish(&[], &removed);
        }
        removed
    }

    /// Make the content equal to `items` (duplicates dropped), publishing
    /// the removed and added items in one round.
    pub fn replace_all(&self, items: impl IntoIterator<Item = T>) -> Change<T> {
        let change = {
            let mut store = self.store.borrow_mut();
            let old = store.to_vec();

            let mut next = S::default();
            for item in items {
                if !next.contains(&item) {
                    next.insert(item);
                }
            }
            let new = next.to_vec();

            let removed: Vec<T> = old.iter().filter(|i| !next.contains(i)).cloned().collect();
            let added: Vec<T> = new.iter().filter(|i| !store.contains(i)).cloned().collect();

            // Relative order of the surviving items.
            let kept_before = old.iter().filter(|i| next.contains(i));
            let kept_after = new.iter().filter(|i| store.contains(i));
            let reordered = !kept_before.eq(kept_after);

            store.set_all(new);
            Change {
                added,
                removed,
                reordered,
            }
        };
        if change.is_membership_change() {
            self.publish(&change.added, &change.removed);
        } else if change.reordered {
            let _round = self.publisher.round();
            self.publisher.notify(self.events.changed.clone(), self.source, None);
        }
        change
    }

    fn publish(&self, added: &[T], removed: &[T]) {
        let _round = self.publisher.round();
        if !removed.is_empty() {
            self.publisher.notify(
                self.events.removed.clone(),
                self.source,
                Some(Rc::new(removed.to_vec())),
            );
        }
        if !added.is_empty() {
            self.publisher.notify(
                self.events.added.clone(),
                self.source,
                Some(Rc::new(added.to_vec())),
            );
        }
        self.publisher
            .notify(self.events.changed.clone(), self.source, None);
    }
}

impl<T: Clone + PartialEq + 'static, S: Store<T> + 'static> Collection<T> for ObservableCollection<T, S> {
    fn source_id(&self) -> SourceId {
        self.source
    }

    fn event_types(&self) -> &CollectionEventTypes {
        &self.events
    }

    fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    fn items(&self) -> Vec<T> {
        ObservableCollection::items(self)
    }

    fn contains(&self, item: &T) -> bool {
        ObservableCollection::contains(self, item)
    }

    fn len(&self) -> usize {
        ObservableCollection::len(self)
    }

    fn extend_items(&self, items: Vec<T>) -> Vec<T> {
        self.extend(items)
    }

    fn remove_items(&self, items: &[T]) -> Vec<T> {
        ObservableCollection::remove_items(self, items)
    }

    fn replace_all(&self, items: Vec<T>) -> Change<T> {
        ObservableCollection::replace_all(self, items)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
