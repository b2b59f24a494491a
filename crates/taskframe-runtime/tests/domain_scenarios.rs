//! End-to-end scenarios over a small task domain: owned notes, a task tree,
//! a filtered view, and undo/redo through a [`Context`].

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use taskframe_core::{Callback, Event, Publisher, SourceId, legacy};
use taskframe_runtime::reactive::{Collection, CollectionEventTypes, OwnedCollection};
use taskframe_runtime::undo::{ExtendCmd, FnCmd, ReparentCmd, ReplaceAllCmd};
use taskframe_runtime::{
    Attribute, Context, FilteredView, ObservableList, Owner, Tree, UndoableCmd,
};
use tracing::Level;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::DEBUG)
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
struct Note(&'static str);

#[derive(Debug, Clone, PartialEq)]
struct Attachment(&'static str);

/// Task with two independent owned relationships and an observable flag.
#[derive(Clone, Owner)]
struct Task {
    id: u32,
    source: SourceId,
    active: Attribute<bool>,
    #[owned]
    notes: OwnedCollection<Note>,
    #[owned]
    attachments: OwnedCollection<Attachment>,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Task {
    fn new(publisher: &Publisher, id: u32, active: bool) -> Self {
        let source = SourceId::next();
        Self {
            id,
            source,
            active: Attribute::new(publisher, source, "Task.active", active),
            notes: Self::new_notes(publisher, source),
            attachments: Self::new_attachments(publisher, source),
        }
    }
}

fn recorder(publisher: &Publisher, types: &[&str]) -> (Callback, Rc<RefCell<Vec<Event>>>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let cb = Callback::from_fn(move |e| sink.borrow_mut().push(e.clone()));
    for t in types {
        publisher.register_observer(&cb, *t, None);
    }
    (cb, log)
}

fn counter(log: &Rc<RefCell<Vec<String>>>, name: &'static str) -> Box<dyn UndoableCmd> {
    let (l1, l2) = (Rc::clone(log), Rc::clone(log));
    Box::new(FnCmd::new(
        name,
        move || {
            l1.borrow_mut().push(format!("do {name}"));
            Ok(())
        },
        move || {
            l2.borrow_mut().push(format!("undo {name}"));
            Ok(())
        },
    ))
}

#[test]
fn owner_add_and_remove_scenario() {
    let ctx = Context::new();
    let task = Task::new(ctx.publisher(), 1, true);
    let (_cb, log) = recorder(ctx.publisher(), &["Task.noteAdded", "Task.noteRemoved"]);

    task.add_notes([Note("f1"), Note("f2")]);
    assert_eq!(task.notes(), vec![Note("f1"), Note("f2")]);
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(log.borrow()[0].sources(), BTreeSet::from([task.source]));
    assert!(log.borrow()[0].has_type(Task::note_added_event_type().as_str()));

    task.remove_notes(&[Note("f1")]);
    assert_eq!(task.notes(), vec![Note("f2")]);
    assert_eq!(log.borrow().len(), 2);
    assert_eq!(
        log.borrow()[1].items::<Note>(task.source, "Task.noteRemoved"),
        &[Note("f1")]
    );

    task.add_attachments([Attachment("budget.xlsx")]);
    assert_eq!(log.borrow().len(), 2, "attachments are a separate relationship");
}

#[test]
fn viewer_follows_every_owned_relationship() {
    let ctx = Context::new();
    let task = Task::new(ctx.publisher(), 1, true);
    let types: Vec<String> = Task::modification_event_types()
        .iter()
        .map(ToString::to_string)
        .collect();
    let types: Vec<&str> = types.iter().map(String::as_str).collect();
    assert_eq!(types, vec!["Task.notesChanged", "Task.attachmentsChanged"]);
    let (_cb, log) = recorder(ctx.publisher(), &types);

    task.add_note(Note("agenda"));
    task.add_attachment(Attachment("minutes.txt"));
    task.remove_notes(&[]);
    assert_eq!(log.borrow().len(), 3);
    assert!(log.borrow().iter().all(|e| e.sources() == BTreeSet::from([task.source])));
}

#[test]
fn owner_set_is_undoable() {
    init_tracing();
    let ctx = Context::new();
    let task = Task::new(ctx.publisher(), 1, true);
    task.set_notes([Note("a")]);

    let target: Rc<dyn Collection<Note>> = Rc::new(task.notes.list().clone());
    ctx.execute(Box::new(ReplaceAllCmd::new(
        "Edit notes",
        target,
        vec![Note("b"), Note("c")],
    )))
    .unwrap();
    assert_eq!(task.notes(), vec![Note("b"), Note("c")]);

    ctx.undo().unwrap().unwrap();
    assert_eq!(task.notes(), vec![Note("a")]);
    ctx.redo().unwrap().unwrap();
    assert_eq!(task.notes(), vec![Note("b"), Note("c")]);
}

#[test]
fn history_branching_scenario() {
    init_tracing();
    let ctx = Context::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    ctx.execute(counter(&log, "cmd1")).unwrap();
    ctx.execute(counter(&log, "cmd2")).unwrap();
    assert!(ctx.undo().is_some());
    assert_eq!(log.borrow().last().map(String::as_str), Some("undo cmd2"));
    assert!(ctx.has_future());

    ctx.execute(counter(&log, "cmd3")).unwrap();
    assert!(!ctx.has_future());
    assert!(ctx.redo().is_none());
    assert_eq!(ctx.history().history(), vec!["cmd1", "cmd3"]);
    assert_eq!(ctx.undo_label("Undo"), "Undo cmd3");
}

#[test]
fn filtered_view_follows_attribute_changes() {
    let ctx = Context::new();
    let publisher = ctx.publisher();
    let tasks: ObservableList<Task> =
        ObservableList::new(publisher, CollectionEventTypes::for_collection("TaskList", "tasks"));
    let idle = Task::new(publisher, 1, false);
    let busy = Task::new(publisher, 2, true);
    tasks.extend([idle.clone(), busy.clone()]);

    let active = FilteredView::new(tasks.clone(), "ActiveTasks", |t: &Task| t.active.get());
    active.watch("Task.active");
    assert_eq!(active.len(), 1);

    let (_cb, log) = recorder(publisher, &["ActiveTasks.itemsAdded"]);
    idle.active.set(true);
    assert_eq!(log.borrow().len(), 1);
    let added = log.borrow()[0]
        .items::<Task>(active.source_id(), "ActiveTasks.itemsAdded")
        .iter()
        .map(|t| t.id)
        .collect::<Vec<_>>();
    assert_eq!(added, vec![1]);
    assert_eq!(tasks.len(), 2);
}

#[test]
fn tree_reparent_undo_replays_events() {
    init_tracing();
    let ctx = Context::new();
    let tree = Tree::new(ctx.publisher(), "Tasks");
    let home = tree.insert("home", None).unwrap();
    let work = tree.insert("work", None).unwrap();
    let report = tree.insert("report", Some(home)).unwrap();
    let (_cb, log) = recorder(ctx.publisher(), &["Tasks.parentChanged"]);

    ctx.execute(Box::new(ReparentCmd::new("Move task", tree.clone(), report, Some(work))))
        .unwrap();
    assert_eq!(tree.parent(report), Some(work));
    ctx.undo().unwrap().unwrap();
    assert_eq!(tree.parent(report), Some(home));
    assert_eq!(log.borrow().len(), 2);
}

#[test]
fn legacy_observers_get_value_and_sender() {
    let ctx = Context::new();
    let tasks: ObservableList<u32> = ObservableList::new(
        ctx.publisher(),
        CollectionEventTypes::for_collection("TaskList", "tasks"),
    );
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let cb = legacy::value_sender::<Vec<u32>>(move |items, sender| {
        sink.borrow_mut().push((items.clone(), sender));
    });
    ctx.publisher()
        .register_observer(&cb, tasks.event_types().added.clone(), None);

    let target: Rc<dyn Collection<u32>> = Rc::new(tasks.clone());
    ctx.execute(Box::new(ExtendCmd::new("Add", target, vec![1, 2])))
        .unwrap();
    assert_eq!(*seen.borrow(), vec![(vec![1, 2], tasks.source_id())]);
}
