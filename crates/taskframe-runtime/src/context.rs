#![forbid(unsafe_code)]

//! Explicit service bundle: one bus and one history.
//!
//! Components receive a [`Context`] (or its [`Publisher`]) instead of
//! reaching for process-wide singletons. [`Context::global`] hands out a
//! per-thread default instance for applications that want exactly one;
//! tests build fresh contexts for isolation.
//!
//! Commands run while the history is *not* borrowed, so observers reacting
//! to a command's events may query labels or inspect the history.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use taskframe_core::{Publisher, PublisherConfig};

use crate::undo::history::Direction;
use crate::undo::{CommandError, CommandHistory, CommandResult, HistoryConfig, UndoableCmd};

/// Configuration for a [`Context`].
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    pub publisher: PublisherConfig,
    pub history: HistoryConfig,
}

impl ContextConfig {
    #[must_use]
    pub fn with_publisher(mut self, publisher: PublisherConfig) -> Self {
        self.publisher = publisher;
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = history;
        self
    }
}

struct ContextInner {
    publisher: Publisher,
    history: RefCell<CommandHistory>,
}

/// Shared handle to a publisher and command history.
///
/// Cloning creates a new handle to the **same** services.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("publisher", &self.inner.publisher)
            .field("history", &self.inner.history.try_borrow().ok())
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static GLOBAL: Context = Context::new();
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ContextConfig) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                publisher: Publisher::new(config.publisher),
                history: RefCell::new(CommandHistory::new(config.history)),
            }),
        }
    }

    /// The calling thread's default context.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL.with(Context::clone)
    }

    /// Whether two handles refer to the same services.
    #[must_use]
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn publisher(&self) -> &Publisher {
        &self.inner.publisher
    }

    /// Borrow the history for inspection.
    ///
    /// # Panics
    ///
    /// If called while the history is mutably borrowed, which only happens
    /// inside [`CommandHistory`] bookkeeping, never while a command runs.
    #[must_use]
    pub fn history(&self) -> Ref<'_, CommandHistory> {
        self.inner.history.borrow()
    }

    /// Execute `cmd` and record it, discarding the future.
    ///
    /// # Errors
    ///
    /// Returns the command's error; nothing is recorded.
    pub fn execute(&self, mut cmd: Box<dyn UndoableCmd>) -> CommandResult {
        cmd.execute()?;
        self.inner.history.borrow_mut().push(cmd);
        Ok(())
    }

    /// Record a command that was executed elsewhere.
    pub fn push(&self, cmd: Box<dyn UndoableCmd>) {
        self.inner.history.borrow_mut().push(cmd);
    }

    /// See [`CommandHistory::undo`].
    pub fn undo(&self) -> Option<Result<String, CommandError>> {
        self.step(Direction::Undo)
    }

    /// See [`CommandHistory::redo`].
    pub fn redo(&self) -> Option<Result<String, CommandError>> {
        self.step(Direction::Redo)
    }

    fn step(&self, direction: Direction) -> Option<Result<String, CommandError>> {
        let mut cmd = self.inner.history.borrow_mut().take(direction)?;
        let result = match direction {
            Direction::Undo => cmd.undo(),
            Direction::Redo => cmd.redo(),
        };
        Some(self.inner.history.borrow_mut().settle(direction, cmd, result))
    }

    #[must_use]
    pub fn has_history(&self) -> bool {
        self.history().has_history()
    }

    #[must_use]
    pub fn has_future(&self) -> bool {
        self.history().has_future()
    }

    #[must_use]
    pub fn undo_label(&self, base: &str) -> String {
        self.history().undo_label(base)
    }

    #[must_use]
    pub fn redo_label(&self, base: &str) -> String {
        self.history().redo_label(base)
    }

    /// Forget all history.
    pub fn clear_history(&self) {
        self.inner.history.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Collection, CollectionEventTypes, ObservableList};
    use crate::undo::ExtendCmd;
    use pretty_assertions::assert_eq;
    use taskframe_core::Callback;

    fn tasks(ctx: &Context) -> ObservableList<&'static str> {
        ObservableList::new(
            ctx.publisher(),
            CollectionEventTypes::for_collection("TaskList", "tasks"),
        )
    }

    fn add(list: &ObservableList<&'static str>, item: &'static str) -> Box<dyn UndoableCmd> {
        let target: Rc<dyn Collection<&'static str>> = Rc::new(list.clone());
        Box::new(ExtendCmd::new("New task", target, vec![item]))
    }

    #[test]
    fn execute_undo_redo() {
        let ctx = Context::new();
        let list = tasks(&ctx);
        ctx.execute(add(&list, "a")).unwrap();
        assert_eq!(ctx.undo_label("Undo"), "Undo new task");

        assert_eq!(ctx.undo(), Some(Ok("New task".to_string())));
        assert!(list.is_empty());
        assert!(ctx.has_future());
        assert_eq!(ctx.redo(), Some(Ok("New task".to_string())));
        assert_eq!(list.items(), vec!["a"]);
    }

    #[test]
    fn observers_can_read_labels_during_undo() {
        let ctx = Context::new();
        let list = tasks(&ctx);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (reader, sink) = (ctx.clone(), Rc::clone(&seen));
        let cb = Callback::from_fn(move |_| sink.borrow_mut().push(reader.redo_label("Redo")));
        ctx.publisher()
            .register_observer(&cb, list.event_types().removed.clone(), None);

        ctx.execute(add(&list, "a")).unwrap();
        ctx.undo();
        assert_eq!(*seen.borrow(), vec!["Redo".to_string()]);
        assert_eq!(ctx.redo_label("Redo"), "Redo new task");
    }

    #[test]
    fn fresh_contexts_are_isolated() {
        let a = Context::new();
        let b = Context::new();
        a.execute(add(&tasks(&a), "x")).unwrap();
        assert!(a.has_history());
        assert!(!b.has_history());
        assert!(!a.publisher().ptr_eq(b.publisher()));
    }

    #[test]
    fn global_is_per_thread_singleton() {
        assert!(Context::global().ptr_eq(&Context::global()));
        let other = std::thread::spawn(|| Context::global().has_history())
            .join()
            .unwrap();
        assert!(!other);
    }

    #[test]
    fn config_limits_history() {
        let ctx = Context::with_config(
            ContextConfig::default().with_history(HistoryConfig::new(1, 0)),
        );
        let list = tasks(&ctx);
        ctx.execute(add(&list, "a")).unwrap();
        ctx.execute(add(&list, "b")).unwrap();
        assert_eq!(ctx.history().undo_depth(), 1);
        ctx.clear_history();
        assert!(!ctx.has_history());
    }
}
