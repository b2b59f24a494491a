#![forbid(unsafe_code)]

//! Undoable commands over observable structures.
//!
//! This module provides the [`UndoableCmd`] trait for reversible mutations
//! and built-in commands for collections and trees.
//!
//! # Design Principles
//!
//! 1. **Explicit state**: commands capture what they need to reverse
//!    themselves when they execute, not when they are built.
//! 2. **Root targets**: collection commands resolve views to the
//!    undecorated collection, so undo never writes a view's subset back.
//! 3. **Events replay**: undo and redo go through the same observable
//!    mutators as execute, so observers see every state transition.
//!
//! # Invariants
//!
//! - `execute()` followed by `undo()` restores prior state exactly.
//! - `undo()` followed by `redo()` restores the executed state exactly.
//! - `size_bytes()` approximates the retained heap for history budgeting.
//!
//! # Failure Modes
//!
//! - **Stale node**: a tree command whose node was removed elsewhere fails
//!   with [`CommandError::Framework`] and leaves the tree untouched.
//! - **Undo before execute**: [`CommandError::InvalidState`].

use std::fmt;
use std::rc::Rc;

use taskframe_core::FrameworkError;

use crate::reactive::{Collection, NodeId, Position, RemovedSubtree, Tree, root_collection};

/// Metadata attached to every command.
#[derive(Debug, Clone)]
pub struct CommandMetadata {
    /// Human-readable description (e.g. "New task").
    pub description: String,
}

impl CommandMetadata {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }

    /// Size in bytes for memory accounting.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.description.len()
    }
}

impl Default for CommandMetadata {
    fn default() -> Self {
        Self::new("Unknown")
    }
}

/// Result of command execution or undo.
pub type CommandResult = Result<(), CommandError>;

/// Errors raised while executing, undoing or redoing a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The command was asked to do something its lifecycle forbids.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// The command's captured state does not allow the request.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A structural mutation was rejected.
    #[error(transparent)]
    Framework(#[from] FrameworkError),
    #[error("{0}")]
    Other(String),
}

/// A reversible mutation.
///
/// # Implementing `UndoableCmd`
///
/// ```ignore
/// struct RenameCmd {
///     subject: Attribute<String>,
///     old: Option<String>,
///     new: String,
///     metadata: CommandMetadata,
/// }
///
/// impl UndoableCmd for RenameCmd {
///     fn execute(&mut self) -> CommandResult {
///         self.old = Some(self.subject.get());
///         self.subject.set(self.new.clone());
///         Ok(())
///     }
///
///     fn undo(&mut self) -> CommandResult {
///         let old = self.old.clone().ok_or_else(|| {
///             CommandError::InvalidState("not executed".into())
///         })?;
///         self.subject.set(old);
///         Ok(())
///     }
///
///     fn metadata(&self) -> &CommandMetadata {
///         &self.metadata
///     }
/// }
/// ```
pub trait UndoableCmd {
    /// Apply the command's effect.
    ///
    /// # Errors
    ///
    /// Returns error if the command cannot be executed.
    fn execute(&mut self) -> CommandResult;

    /// Revert the command's effect.
    ///
    /// After undo, the observable state MUST match the state before
    /// `execute()`.
    ///
    /// # Errors
    ///
    /// Returns error if the command cannot be undone.
    fn undo(&mut self) -> CommandResult;

    /// Re-apply after undo. Defaults to `execute()`.
    ///
    /// # Errors
    ///
    /// Returns error if the command cannot be redone.
    fn redo(&mut self) -> CommandResult {
        self.execute()
    }

    fn metadata(&self) -> &CommandMetadata;

    /// Human-readable description for labels.
    fn description(&self) -> &str {
        &self.metadata().description
    }

    /// Approximate retained size in bytes.
    fn size_bytes(&self) -> usize {
        std::mem::size_of_val(self) + self.metadata().size_bytes()
    }
}

impl fmt::Debug for dyn UndoableCmd + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoableCmd")
            .field("description", &self.description())
            .finish()
    }
}

fn not_executed(description: &str) -> CommandError {
    CommandError::InvalidState(format!("'{description}' has not been executed"))
}

// ============================================================================
// CommandBatch
// ============================================================================

/// Commands that execute and undo as one history entry.
#[derive(Debug)]
pub struct CommandBatch {
    /// Commands in execution order.
    commands: Vec<Box<dyn UndoableCmd>>,
    metadata: CommandMetadata,
    /// Commands `[0, executed_to)` are currently applied.
    executed_to: usize,
}

impl CommandBatch {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            commands: Vec::new(),
            metadata: CommandMetadata::new(description),
            executed_to: 0,
        }
    }

    /// Add a command to run when the batch executes.
    pub fn push(&mut self, cmd: Box<dyn UndoableCmd>) {
        self.commands.push(cmd);
    }

    /// Add a command that has already been executed.
    ///
    /// Only valid while every earlier command is applied too.
    pub(crate) fn push_executed(&mut self, cmd: Box<dyn UndoableCmd>) {
        self.commands.push(cmd);
        self.executed_to = self.commands.len();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl UndoableCmd for CommandBatch {
    fn execute(&mut self) -> CommandResult {
        let start = self.executed_to;
        for i in start..self.commands.len() {
            if let Err(e) = self.commands[i].execute() {
                for j in (start..i).rev() {
                    let _ = self.commands[j].undo();
                }
                self.executed_to = start;
                return Err(e);
            }
            self.executed_to = i + 1;
        }
        Ok(())
    }

    fn undo(&mut self) -> CommandResult {
        while self.executed_to > 0 {
            self.commands[self.executed_to - 1].undo()?;
            self.executed_to -= 1;
        }
        Ok(())
    }

    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.metadata.size_bytes()
            + self.commands.iter().map(|c| c.size_bytes()).sum::<usize>()
    }
}

// ============================================================================
// FnCmd
// ============================================================================

type Action = Box<dyn FnMut() -> CommandResult>;

/// Command built from a do/undo closure pair.
pub struct FnCmd {
    metadata: CommandMetadata,
    run: Action,
    revert: Action,
}

impl fmt::Debug for FnCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCmd")
            .field("description", &self.metadata.description)
            .finish()
    }
}

impl FnCmd {
    pub fn new(
        description: impl Into<String>,
        run: impl FnMut() -> CommandResult + 'static,
        revert: impl FnMut() -> CommandResult + 'static,
    ) -> Self {
        Self {
            metadata: CommandMetadata::new(description),
            run: Box::new(run),
            revert: Box::new(revert),
        }
    }
}

impl UndoableCmd for FnCmd {
    fn execute(&mut self) -> CommandResult {
        (self.run)()
    }

    fn undo(&mut self) -> CommandResult {
        (self.revert)()
    }

    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }
}

// ============================================================================
// Collection commands
// ============================================================================

/// Add items to a collection; undo removes the ones actually added.
pub struct ExtendCmd<T> {
    target: Rc<dyn Collection<T>>,
    items: Vec<T>,
    added: Option<Vec<T>>,
    metadata: CommandMetadata,
}

impl<T: Clone + 'static> ExtendCmd<T> {
    pub fn new(description: impl Into<String>, target: Rc<dyn Collection<T>>, items: Vec<T>) -> Self {
        Self {
            target: root_collection(target),
            items,
            added: None,
            metadata: CommandMetadata::new(description),
        }
    }
}

impl<T: Clone + 'static> UndoableCmd for ExtendCmd<T> {
    fn execute(&mut self) -> CommandResult {
        self.added = Some(self.target.extend_items(self.items.clone()));
        Ok(())
    }

    fn undo(&mut self) -> CommandResult {
        let added = self
            .added
            .as_ref()
            .ok_or_else(|| not_executed(&self.metadata.description))?;
        self.target.remove_items(added);
        Ok(())
    }

    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.metadata.size_bytes()
            + 2 * self.items.len() * std::mem::size_of::<T>()
    }
}

/// Remove items from a collection; undo restores content and order.
pub struct RemoveItemsCmd<T> {
    target: Rc<dyn Collection<T>>,
    items: Vec<T>,
    before: Option<Vec<T>>,
    metadata: CommandMetadata,
}

impl<T: Clone + 'static> RemoveItemsCmd<T> {
    pub fn new(description: impl Into<String>, target: Rc<dyn Collection<T>>, items: Vec<T>) -> Self {
        Self {
            target: root_collection(target),
            items,
            before: None,
            metadata: CommandMetadata::new(description),
        }
    }
}

impl<T: Clone + 'static> UndoableCmd for RemoveItemsCmd<T> {
    fn execute(&mut self) -> CommandResult {
        self.before = Some(self.target.items());
        self.target.remove_items(&self.items);
        Ok(())
    }

    fn undo(&mut self) -> CommandResult {
        let before = self
            .before
            .clone()
            .ok_or_else(|| not_executed(&self.metadata.description))?;
        self.target.replace_all(before);
        Ok(())
    }

    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    fn size_bytes(&self) -> usize {
        let before = self.before.as_ref().map_or(0, Vec::len);
        std::mem::size_of::<Self>()
            + self.metadata.size_bytes()
            + (self.items.len() + before) * std::mem::size_of::<T>()
    }
}

/// Set a collection's content wholesale; undo puts the old content back.
///
/// Owner `set_*` operations are issued through this command.
pub struct ReplaceAllCmd<T> {
    target: Rc<dyn Collection<T>>,
    items: Vec<T>,
    before: Option<Vec<T>>,
    metadata: CommandMetadata,
}

impl<T: Clone + 'static> ReplaceAllCmd<T> {
    pub fn new(description: impl Into<String>, target: Rc<dyn Collection<T>>, items: Vec<T>) -> Self {
        Self {
            target: root_collection(target),
            items,
            before: None,
            metadata: CommandMetadata::new(description),
        }
    }
}

impl<T: Clone + 'static> UndoableCmd for ReplaceAllCmd<T> {
    fn execute(&mut self) -> CommandResult {
        self.before = Some(self.target.items());
        self.target.replace_all(self.items.clone());
        Ok(())
    }

    fn undo(&mut self) -> CommandResult {
        let before = self
            .before
            .clone()
            .ok_or_else(|| not_executed(&self.metadata.description))?;
        self.target.replace_all(before);
        Ok(())
    }

    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    fn size_bytes(&self) -> usize {
        let before = self.before.as_ref().map_or(0, Vec::len);
        std::mem::size_of::<Self>()
            + self.metadata.size_bytes()
            + (self.items.len() + before) * std::mem::size_of::<T>()
    }
}

// ============================================================================
// Tree commands
// ============================================================================

/// Move a node under a new parent; undo returns it to its old position.
pub struct ReparentCmd<T> {
    tree: Tree<T>,
    node: NodeId,
    new_parent: Option<NodeId>,
    from: Option<Position>,
    metadata: CommandMetadata,
}

impl<T: 'static> ReparentCmd<T> {
    pub fn new(
        description: impl Into<String>,
        tree: Tree<T>,
        node: NodeId,
        new_parent: Option<NodeId>,
    ) -> Self {
        Self {
            tree,
            node,
            new_parent,
            from: None,
            metadata: CommandMetadata::new(description),
        }
    }
}

impl<T: 'static> UndoableCmd for ReparentCmd<T> {
    fn execute(&mut self) -> CommandResult {
        self.from = Some(self.tree.set_parent(self.node, self.new_parent)?);
        Ok(())
    }

    fn undo(&mut self) -> CommandResult {
        let from = self
            .from
            .ok_or_else(|| not_executed(&self.metadata.description))?;
        self.tree.set_parent_at(self.node, from.parent, from.index)?;
        Ok(())
    }

    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }
}

/// Remove a node and its descendants; undo restores them in place.
pub struct DeleteSubtreeCmd<T> {
    tree: Tree<T>,
    node: NodeId,
    removed: Option<RemovedSubtree<T>>,
    metadata: CommandMetadata,
}

impl<T: 'static> DeleteSubtreeCmd<T> {
    pub fn new(description: impl Into<String>, tree: Tree<T>, node: NodeId) -> Self {
        Self {
            tree,
            node,
            removed: None,
            metadata: CommandMetadata::new(description),
        }
    }
}

impl<T: 'static> UndoableCmd for DeleteSubtreeCmd<T> {
    fn execute(&mut self) -> CommandResult {
        self.removed = Some(self.tree.remove(self.node)?);
        Ok(())
    }

    fn undo(&mut self) -> CommandResult {
        let removed = self
            .removed
            .as_ref()
            .ok_or_else(|| not_executed(&self.metadata.description))?;
        // Keep the snapshot when the tree rejects it so undo can be retried.
        self.tree.check_restore(removed)?;
        if let Some(removed) = self.removed.take() {
            self.tree.restore(removed)?;
        }
        Ok(())
    }

    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    fn size_bytes(&self) -> usize {
        let nodes = self.removed.as_ref().map_or(0, RemovedSubtree::len);
        std::mem::size_of::<Self>()
            + self.metadata.size_bytes()
            + nodes * std::mem::size_of::<T>()
    }
}

// ============================================================================
// Tests
// ============================================================================
