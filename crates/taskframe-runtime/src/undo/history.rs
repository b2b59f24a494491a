#![forbid(unsafe_code)]

//! Linear undo/redo history.
//!
//! [`CommandHistory`] keeps two stacks: the past (executed commands) and
//! the future (undone commands).
//!
//! - **Linear timeline**: appending a command discards the whole future.
//! - **Depth limit**: the oldest past entries are evicted beyond
//!   `max_depth`.
//! - **Memory limit**: entries are evicted, future first, while the total
//!   `size_bytes()` exceeds `max_bytes`.
//!
//! # Invariants
//!
//! 1. `total_bytes` equals the sum of `size_bytes()` over both stacks.
//! 2. A command is on at most one stack.
//! 3. A command whose undo or redo fails stays on the stack it came from.
//!
//! ```text
//! execute(cmd3)
//! ┌──────────────────────────────┐
//! │ past:   [cmd1, cmd2, cmd3]   │
//! │ future: []                   │
//! └──────────────────────────────┘
//!
//! undo()
//! ┌──────────────────────────────┐
//! │ past:   [cmd1, cmd2]         │
//! │ future: [cmd3]               │
//! └──────────────────────────────┘
//!
//! execute(cmd4)  <-- discards the future
//! ┌──────────────────────────────┐
//! │ past:   [cmd1, cmd2, cmd4]   │
//! │ future: []                   │
//! └──────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, warn};

use super::command::{CommandError, CommandResult, UndoableCmd};

/// Limits for a [`CommandHistory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Maximum number of undoable commands.
    pub max_depth: usize,
    /// Maximum total bytes across both stacks (0 = unlimited).
    pub max_bytes: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            max_bytes: 10 * 1024 * 1024, // 10 MB
        }
    }
}

impl HistoryConfig {
    #[must_use]
    pub fn new(max_depth: usize, max_bytes: usize) -> Self {
        Self {
            max_depth,
            max_bytes,
        }
    }

    /// No limits (for testing).
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_depth: usize::MAX,
            max_bytes: 0,
        }
    }
}

/// Which stack a command travels from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Undo,
    Redo,
}

/// Past/future command stacks.
pub struct CommandHistory {
    /// Executed commands (newest at back).
    past: VecDeque<Box<dyn UndoableCmd>>,
    /// Undone commands (most recently undone at back).
    future: VecDeque<Box<dyn UndoableCmd>>,
    config: HistoryConfig,
    total_bytes: usize,
}

impl fmt::Debug for CommandHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHistory")
            .field("past", &self.past.len())
            .field("future", &self.future.len())
            .field("total_bytes", &self.total_bytes)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl CommandHistory {
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            past: VecDeque::new(),
            future: VecDeque::new(),
            config,
            total_bytes: 0,
        }
    }

    // ========================================================================
    // Core Operations
    // ========================================================================

    /// Execute `cmd` and append it to the past.
    ///
    /// # Errors
    ///
    /// Returns the command's error; a failed command is not recorded and
    /// the future is kept.
    pub fn execute(&mut self, mut cmd: Box<dyn UndoableCmd>) -> CommandResult {
        cmd.execute()?;
        self.push(cmd);
        Ok(())
    }

    /// Append an already executed command, discarding the future.
    pub fn push(&mut self, cmd: Box<dyn UndoableCmd>) {
        self.clear_future();
        debug!(command = cmd.description(), "history push");
        self.total_bytes += cmd.size_bytes();
        self.past.push_back(cmd);
        self.enforce_limits();
    }

    /// Undo the most recent command and move it to the future.
    ///
    /// # Returns
    ///
    /// - `Some(Ok(description))` if undo succeeded
    /// - `Some(Err(error))` if undo failed (command stays in the past)
    /// - `None` if there is nothing to undo
    pub fn undo(&mut self) -> Option<Result<String, CommandError>> {
        let mut cmd = self.take(Direction::Undo)?;
        let result = cmd.undo();
        Some(self.settle(Direction::Undo, cmd, result))
    }

    /// Redo the most recently undone command and move it back to the past.
    ///
    /// # Returns
    ///
    /// - `Some(Ok(description))` if redo succeeded
    /// - `Some(Err(error))` if redo failed (command stays in the future)
    /// - `None` if there is nothing to redo
    pub fn redo(&mut self) -> Option<Result<String, CommandError>> {
        let mut cmd = self.take(Direction::Redo)?;
        let result = cmd.redo();
        Some(self.settle(Direction::Redo, cmd, result))
    }

    /// Pop the next command to undo or redo, releasing its bytes.
    pub(crate) fn take(&mut self, direction: Direction) -> Option<Box<dyn UndoableCmd>> {
        let cmd = match direction {
            Direction::Undo => self.past.pop_back(),
            Direction::Redo => self.future.pop_back(),
        }?;
        self.total_bytes = self.total_bytes.saturating_sub(cmd.size_bytes());
        Some(cmd)
    }

    /// Put a command taken with [`take`](Self::take) on the stack its
    /// outcome calls for.
    pub(crate) fn settle(
        &mut self,
        direction: Direction,
        cmd: Box<dyn UndoableCmd>,
        result: CommandResult,
    ) -> Result<String, CommandError> {
        let description = cmd.description().to_string();
        self.total_bytes += cmd.size_bytes();
        match (direction, result) {
            (Direction::Undo, Ok(())) => {
                debug!(command = %description, "undo");
                self.future.push_back(cmd);
            }
            (Direction::Redo, Ok(())) => {
                debug!(command = %description, "redo");
                self.past.push_back(cmd);
            }
            (Direction::Undo, Err(e)) => {
                warn!(command = %description, error = %e, "undo failed");
                self.past.push_back(cmd);
                return Err(e);
            }
            (Direction::Redo, Err(e)) => {
                warn!(command = %description, error = %e, "redo failed");
                self.future.push_back(cmd);
                return Err(e);
            }
        }
        self.enforce_limits();
        Ok(description)
    }

    // ========================================================================
    // Info
    // ========================================================================

    #[must_use]
    pub fn has_history(&self) -> bool {
        !self.past.is_empty()
    }

    #[must_use]
    pub fn has_future(&self) -> bool {
        !self.future.is_empty()
    }

    /// Descriptions of the past, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<&str> {
        self.past.iter().map(|c| c.description()).collect()
    }

    /// Descriptions of the future, next to redo last.
    #[must_use]
    pub fn future(&self) -> Vec<&str> {
        self.future.iter().map(|c| c.description()).collect()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    #[must_use]
    pub fn next_undo_description(&self) -> Option<&str> {
        self.past.back().map(|c| c.description())
    }

    #[must_use]
    pub fn next_redo_description(&self) -> Option<&str> {
        self.future.back().map(|c| c.description())
    }

    /// `"<base> <next undo, lowercased>"`, or `base` alone when there is
    /// nothing to undo.
    #[must_use]
    pub fn undo_label(&self, base: &str) -> String {
        label(base, self.next_undo_description())
    }

    /// Mirror of [`undo_label`](Self::undo_label) for redo.
    #[must_use]
    pub fn redo_label(&self, base: &str) -> String {
        label(base, self.next_redo_description())
    }

    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.total_bytes
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Forget both stacks.
    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
        self.total_bytes = 0;
    }

    fn clear_future(&mut self) {
        for cmd in self.future.drain(..) {
            self.total_bytes = self.total_bytes.saturating_sub(cmd.size_bytes());
        }
    }

    fn enforce_limits(&mut self) {
        while self.past.len() > self.config.max_depth {
            if let Some(cmd) = self.past.pop_front() {
                self.total_bytes = self.total_bytes.saturating_sub(cmd.size_bytes());
            }
        }

        if self.config.max_bytes > 0 {
            while self.total_bytes > self.config.max_bytes {
                if let Some(cmd) = self.future.pop_front() {
                    self.total_bytes = self.total_bytes.saturating_sub(cmd.size_bytes());
                    continue;
                }
                if let Some(cmd) = self.past.pop_front() {
                    self.total_bytes = self.total_bytes.saturating_sub(cmd.size_bytes());
                } else {
                    break;
                }
            }
        }
    }
}

fn label(base: &str, description: Option<&str>) -> String {
    match description {
        Some(d) => format!("{base} {}", d.to_lowercase()),
        None => base.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
