#![forbid(unsafe_code)]

//! Observable domain structures.
//!
//! - [`Attribute`]: owner-sourced value that reports changes.
//! - [`ObservableList`] / [`ObservableSet`]: collections that report
//!   membership deltas, one round per call.
//! - [`FilteredView`] / [`SortedView`]: derived views that re-publish the
//!   base's changes under their own source.
//! - [`Tree`]: arena-backed composite with reparenting and subtree removal.
//! - [`OwnedCollection`] and [`Owner`](crate::Owner): owner/owned
//!   relationships.
//!
//! # Architecture
//!
//! Every structure is a cheap-clone `Rc` handle sharing one
//! [`Publisher`](taskframe_core::Publisher). Internal borrows are always
//! released before publishing, so observers can read and mutate the
//! structure that notified them.

pub mod attribute;
pub mod collection;
pub mod composite;
pub mod decorator;
pub mod owner;

pub use attribute::Attribute;
pub use collection::{
    Change, Collection, CollectionEventTypes, ListStore, ObservableCollection, ObservableList,
    ObservableSet, SetStore, Store, root_collection,
};
pub use composite::{Ancestors, NodeId, Position, RemovedSubtree, Tree, TreeEventTypes};
pub use decorator::{FilteredView, SortedView};
pub use owner::OwnedCollection;
