#![forbid(unsafe_code)]

//! Undo/redo.
//!
//! - [`UndoableCmd`]: a reversible mutation, plus built-in commands for
//!   collections and trees.
//! - [`CommandHistory`]: linear past/future stacks with depth and memory
//!   limits.
//! - [`Transaction`] / [`TransactionScope`]: group commands into a single
//!   history entry with rollback.

pub mod command;
pub mod history;
pub mod transaction;

pub use command::{
    CommandBatch, CommandError, CommandMetadata, CommandResult, DeleteSubtreeCmd,
    ExtendCmd, FnCmd, RemoveItemsCmd, ReparentCmd, ReplaceAllCmd, UndoableCmd,
};
pub use history::{CommandHistory, HistoryConfig};
pub use transaction::{Transaction, TransactionScope};
