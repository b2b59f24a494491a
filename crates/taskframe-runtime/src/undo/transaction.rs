#![forbid(unsafe_code)]

//! Grouping several commands into one history entry.
//!
//! ```ignore
//! let mut txn = Transaction::begin("Import tasks");
//! txn.execute(Box::new(ExtendCmd::new("Add", tasks.clone(), imported)))?;
//! txn.execute(Box::new(ReparentCmd::new("Move", tree.clone(), node, Some(folder))))?;
//! if let Some(cmd) = txn.commit() {
//!     history.push(cmd);
//! }
//! ```
//!
//! [`TransactionScope`] nests transactions on top of a
//! [`CommandHistory`]; an inner commit becomes one step of the outer
//! transaction.
//!
//! # Invariants
//!
//! 1. A committed transaction is a single entry in history.
//! 2. Rollback undoes executed commands in reverse order.
//! 3. A transaction dropped without commit rolls back.
//! 4. An empty transaction produces no history entry.

use std::fmt;

use tracing::debug;

use super::command::{CommandBatch, CommandError, CommandResult, UndoableCmd};
use super::history::CommandHistory;

fn finalized() -> CommandError {
    CommandError::InvalidOperation("transaction already finalized".to_string())
}

/// Commands executed together and undone together.
pub struct Transaction {
    batch: CommandBatch,
    finalized: bool,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("description", &self.batch.description())
            .field("commands", &self.batch.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl Transaction {
    #[must_use]
    pub fn begin(description: impl Into<String>) -> Self {
        Self {
            batch: CommandBatch::new(description),
            finalized: false,
        }
    }

    /// Execute `cmd` now and make it part of the transaction.
    ///
    /// # Errors
    ///
    /// If `cmd` fails, every command executed so far is rolled back, the
    /// transaction is finalized, and the error is returned.
    pub fn execute(&mut self, mut cmd: Box<dyn UndoableCmd>) -> CommandResult {
        if self.finalized {
            return Err(finalized());
        }
        if let Err(e) = cmd.execute() {
            self.rollback();
            return Err(e);
        }
        self.batch.push_executed(cmd);
        Ok(())
    }

    /// Add a command that was executed elsewhere.
    ///
    /// # Errors
    ///
    /// [`CommandError::InvalidOperation`] once finalized.
    pub fn add_executed(&mut self, cmd: Box<dyn UndoableCmd>) -> CommandResult {
        if self.finalized {
            return Err(finalized());
        }
        self.batch.push_executed(cmd);
        Ok(())
    }

    /// Finish the transaction as one command, or `None` if it is empty or
    /// was rolled back.
    #[must_use]
    pub fn commit(mut self) -> Option<Box<dyn UndoableCmd>> {
        if self.finalized {
            return None;
        }
        self.finalized = true;
        if self.batch.is_empty() {
            return None;
        }
        debug!(transaction = self.batch.description(), commands = self.batch.len(), "commit");
        let batch = std::mem::replace(&mut self.batch, CommandBatch::new(""));
        Some(Box::new(batch))
    }

    /// Undo everything executed so far. Idempotent.
    pub fn rollback(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        if !self.batch.is_empty() {
            debug!(transaction = self.batch.description(), "rollback");
            let _ = self.batch.undo();
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    #[must_use]
    pub fn description(&self) -> &str {
        self.batch.description()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finalized {
            self.rollback();
        }
    }
}

/// Stack of nested transactions feeding a [`CommandHistory`].
pub struct TransactionScope<'a> {
    history: &'a mut CommandHistory,
    stack: Vec<Transaction>,
}

impl<'a> TransactionScope<'a> {
    #[must_use]
    pub fn new(history: &'a mut CommandHistory) -> Self {
        Self {
            history,
            stack: Vec::new(),
        }
    }

    /// Open a nested transaction.
    pub fn begin(&mut self, description: impl Into<String>) {
        self.stack.push(Transaction::begin(description));
    }

    /// Execute in the innermost transaction, or straight into history when
    /// none is open.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub fn execute(&mut self, cmd: Box<dyn UndoableCmd>) -> CommandResult {
        match self.stack.last_mut() {
            Some(txn) => txn.execute(cmd),
            None => self.history.execute(cmd),
        }
    }

    /// Commit the innermost transaction into its parent or into history.
    ///
    /// # Errors
    ///
    /// [`CommandError::InvalidState`] when no transaction is open.
    pub fn commit(&mut self) -> CommandResult {
        let txn = self
            .stack
            .pop()
            .ok_or_else(|| CommandError::InvalidState("no active transaction".to_string()))?;
        if let Some(cmd) = txn.commit() {
            match self.stack.last_mut() {
                Some(parent) => parent.add_executed(cmd)?,
                None => self.history.push(cmd),
            }
        }
        Ok(())
    }

    /// Roll back the innermost transaction.
    ///
    /// # Errors
    ///
    /// [`CommandError::InvalidState`] when no transaction is open.
    pub fn rollback(&mut self) -> CommandResult {
        let mut txn = self
            .stack
            .pop()
            .ok_or_else(|| CommandError::InvalidState("no active transaction".to_string()))?;
        txn.rollback();
        Ok(())
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.stack.is_empty()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        while let Some(mut txn) = self.stack.pop() {
            txn.rollback();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
