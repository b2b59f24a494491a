#![forbid(unsafe_code)]

//! Owner/owned relationships.
//!
//! An owner object keeps each kind of owned object in an
//! [`OwnedCollection`] field. The collection reports under the *owner's*
//! source, with names derived from the owner and owned type names:
//!
//! | Fact    | Event type           | Value        |
//! |---------|----------------------|--------------|
//! | added   | `"Task.noteAdded"`   | `Vec<Note>`  |
//! | removed | `"Task.noteRemoved"` | `Vec<Note>`  |
//! | changed | `"Task.notesChanged"`| none         |
//!
//! `#[derive(Owner)]` (from `taskframe-macros`, re-exported as
//! [`crate::Owner`]) generates the accessor, mutator and event-type
//! functions for every `#[owned]` field, naming them after the owned type.
//! An owner may hold any number of relationships.
//!
//! Getters hide items the liveness predicate rejects, matching how deleted
//! domain objects disappear from their owner without being removed.

use std::fmt;
use std::rc::Rc;

use taskframe_core::{EventType, Publisher, SourceId};

use super::collection::{Change, CollectionEventTypes, ObservableList};

type Liveness<T> = Rc<dyn Fn(&T) -> bool>;
type ChildrenOf<T> = Rc<dyn Fn(&T) -> Vec<T>>;

/// Owner-sourced observable list of owned objects.
pub struct OwnedCollection<T> {
    list: ObservableList<T>,
    live: Option<Liveness<T>>,
    children: Option<ChildrenOf<T>>,
}

impl<T> Clone for OwnedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            list: self.list.clone(),
            live: self.live.clone(),
            children: self.children.clone(),
        }
    }
}

impl<T: fmt::Debug + Clone + PartialEq + 'static> fmt::Debug for OwnedCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedCollection")
            .field("owner", &self.list.source_id())
            .field("items", &self.list.items())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> OwnedCollection<T> {
    #[must_use]
    pub fn new(publisher: &Publisher, owner: SourceId, owner_type: &str, owned_type: &str) -> Self {
        Self {
            list: ObservableList::with_source(
                publisher,
                CollectionEventTypes::for_owned(owner_type, owned_type),
                owner,
            ),
            live: None,
            children: None,
        }
    }

    /// Treat items failing `live` as deleted in [`items_where_live`].
    ///
    /// [`items_where_live`]: Self::items_where_live
    #[must_use]
    pub fn with_liveness(mut self, live: impl Fn(&T) -> bool + 'static) -> Self {
        self.live = Some(Rc::new(live));
        self
    }

    /// Direct children of an owned item, for [`items_recursive`].
    ///
    /// [`items_recursive`]: Self::items_recursive
    #[must_use]
    pub fn with_children(mut self, children: impl Fn(&T) -> Vec<T> + 'static) -> Self {
        self.children = Some(Rc::new(children));
        self
    }

    #[must_use]
    pub fn owner(&self) -> SourceId {
        self.list.source_id()
    }

    #[must_use]
    pub fn event_types(&self) -> &CollectionEventTypes {
        self.list.event_types()
    }

    #[must_use]
    pub fn added_event_type(&self) -> EventType {
        self.list.event_types().added.clone()
    }

    #[must_use]
    pub fn removed_event_type(&self) -> EventType {
        self.list.event_types().removed.clone()
    }

    #[must_use]
    pub fn changed_event_type(&self) -> EventType {
        self.list.event_types().changed.clone()
    }

    /// Event types that signal a modification of the owner.
    #[must_use]
    pub fn modification_event_types(&self) -> Vec<EventType> {
        vec![self.changed_event_type()]
    }

    /// The underlying list, e.g. as a command target or view base.
    #[must_use]
    pub fn list(&self) -> &ObservableList<T> {
        &self.list
    }

    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.list.items()
    }

    /// Items the liveness predicate accepts; all items without one.
    #[must_use]
    pub fn items_where_live(&self) -> Vec<T> {
        match &self.live {
            Some(live) => self.list.items().into_iter().filter(|i| live(i)).collect(),
            None => self.list.items(),
        }
    }

    /// Live items followed by the descendants of each, level by level per
    /// item. Descendants are not filtered by liveness.
    #[must_use]
    pub fn items_recursive(&self) -> Vec<T> {
        let mut out = self.items_where_live();
        if let Some(children) = &self.children {
            let top = out.clone();
            for item in &top {
                extend_descendants(children.as_ref(), item, &mut out);
            }
        }
        out
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Make the content equal to `items`, removing and adding in one round.
    pub fn set(&self, items: impl IntoIterator<Item = T>) -> Change<T> {
        self.list.replace_all(items)
    }

    pub fn add(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        self.list.extend(items)
    }

    /// Add one item; `false` when it was already owned.
    pub fn add_one(&self, item: T) -> bool {
        self.list.append(item)
    }

    /// Remove one item; `false` when it was not owned.
    pub fn remove_one(&self, item: &T) -> bool {
        self.list.remove(item)
    }

    /// Remove `items`; an empty slice removes everything.
    pub fn remove(&self, items: &[T]) -> Vec<T> {
        if items.is_empty() {
            self.list.remove_all()
        } else {
            self.list.remove_items(items)
        }
    }

    pub fn remove_all(&self) -> Vec<T> {
        self.list.remove_all()
    }

    /// Snapshot for [`restore_state`](Self::restore_state).
    #[must_use]
    pub fn state(&self) -> Vec<T> {
        self.list.items()
    }

    pub fn restore_state(&self, state: Vec<T>) -> Change<T> {
        self.list.replace_all(state)
    }
}

fn extend_descendants<T: Clone>(children: &dyn Fn(&T) -> Vec<T>, item: &T, out: &mut Vec<T>) {
    let direct = children(item);
    out.extend(direct.iter().cloned());
    for child in &direct {
        extend_descendants(children, child, out);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
