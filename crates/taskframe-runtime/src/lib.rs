#![forbid(unsafe_code)]

//! Runtime: observable domain structures and undo/redo.
//!
//! # Role in Taskframe
//! `taskframe-runtime` builds the domain layer on top of the
//! `taskframe-core` bus. Every structure here reports its changes through a
//! shared [`Publisher`](taskframe_core::Publisher), and every reversible
//! change is a command recorded in a [`CommandHistory`].
//!
//! # Primary responsibilities
//! - **reactive**: attributes, observable lists and sets, filtered and
//!   sorted views, the composite tree, owner/owned relationships.
//! - **undo**: commands, the linear history, transactions.
//! - **context**: the explicit bundle of one bus and one history.
//!
//! # How it fits in the system
//! Viewers subscribe to event types such as `"Task.noteAdded"` or
//! `"Tasks.parentChanged"`. User actions build commands and run them through
//! a [`Context`]; undo and redo replay the same observable mutations, so
//! viewers stay in sync without special casing.

extern crate self as taskframe_runtime;

pub mod context;
pub mod reactive;
pub mod undo;

pub use context::{Context, ContextConfig};
pub use reactive::{
    Attribute, Change, Collection, CollectionEventTypes, FilteredView, NodeId, ObservableList,
    ObservableSet, OwnedCollection, SortedView, Tree,
};
pub use undo::{
    CommandError, CommandHistory, CommandResult, HistoryConfig, Transaction, UndoableCmd,
};

/// Derive owner/owned accessors for `#[owned] OwnedCollection<T>` fields.
pub use taskframe_macros::Owner;

#[doc(hidden)]
pub use taskframe_core;
