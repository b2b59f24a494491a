#![forbid(unsafe_code)]

//! Synchronous publish/subscribe bus with round-based aggregation.
//!
//! # Design
//!
//! [`Publisher`] is a cheap-clone handle to shared, single-threaded state
//! (`Rc` + `RefCell`). Mutators report facts with [`Publisher::notify`];
//! facts accumulate in a *pending* [`Event`] while a dispatch round is open
//! and are delivered together when the outermost round closes.
//!
//! ```text
//! round() ─┐                       ┌─ outermost Round dropped
//!          │ notify(a.removed, p1) │
//!          │ notify(a.added,   p2) │──> one Event {a.removed: p1, a.added: p2}
//!          │ notify(a.moved,   n)  │    narrowed per callback to the
//!          └───────────────────────┘    facts it registered for
//! ```
//!
//! A `notify` outside any round is a round of its own and is delivered
//! before the call returns.
//!
//! # Invariants
//!
//! 1. A callback is invoked at most once per delivered event, however many
//!    of its registrations match.
//! 2. Callbacks run in order of their earliest matching registration.
//! 3. Delivery iterates a snapshot; a callback unregistered by an earlier
//!    callback in the same delivery is skipped.
//! 4. No `RefCell` borrow is held while callbacks run, so callbacks may
//!    register, unregister, and publish.
//! 5. A callback receives only the `(type, source)` facts its registrations
//!    select; facts from other types or filtered-out sources never reach it.
//!
//! # Failure Modes
//!
//! - **Callback error or panic**: logged at `warn`, recorded in the
//!   [`DispatchReport`], and delivery continues with the next callback.
//! - **Runaway re-publishing**: nested deliveries deeper than
//!   [`PublisherConfig::max_dispatch_depth`] are dropped.
//! - **Panic inside a round**: the pending facts are discarded when the
//!   round guard unwinds, so no observer sees a half-applied mutation.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::callback::Callback;
use crate::error::{DispatchError, FrameworkError, Result};
use crate::event::{Event, EventType, Value};
use crate::id::{CallbackId, SourceId};

/// Configuration for the publisher.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Contain panics raised by callbacks instead of unwinding through the
    /// mutator.
    pub catch_panics: bool,
    /// Maximum nesting of deliveries triggered from inside callbacks.
    pub max_dispatch_depth: usize,
    /// Log every single delivery at `trace` level.
    pub trace_deliveries: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            catch_panics: true,
            max_dispatch_depth: 32,
            trace_deliveries: false,
        }
    }
}

impl PublisherConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether callback panics are contained.
    #[must_use]
    pub fn with_catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }

    /// Set the nested delivery limit.
    #[must_use]
    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth;
        self
    }

    /// Set per-delivery trace logging.
    #[must_use]
    pub fn with_trace_deliveries(mut self, enabled: bool) -> Self {
        self.trace_deliveries = enabled;
        self
    }
}

/// Cumulative publisher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Non-empty events delivered.
    pub rounds: u64,
    /// Successful callback invocations.
    pub deliveries: u64,
    /// Callback invocations that returned an error or panicked.
    pub failures: u64,
    /// Events dropped by the depth limit.
    pub dropped: u64,
}

/// Outcome of delivering one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that completed successfully.
    pub delivered: usize,
    /// Isolated failures, in delivery order.
    pub errors: Vec<DispatchError>,
}

impl DispatchReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

struct Registration {
    callback: Callback,
    event_type: EventType,
    source: Option<SourceId>,
}

struct PublisherInner {
    config: PublisherConfig,
    registrations: RefCell<Vec<Registration>>,
    pending: RefCell<Event>,
    open_rounds: Cell<usize>,
    dispatch_depth: Cell<usize>,
    stats: Cell<PublisherStats>,
}

/// Shared handle to the event bus.
///
/// Cloning creates a new handle to the **same** bus.
#[derive(Clone)]
pub struct Publisher {
    inner: Rc<PublisherInner>,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("registrations", &self.inner.registrations.borrow().len())
            .field("open_rounds", &self.inner.open_rounds.get())
            .field("pending", &*self.inner.pending.borrow())
            .field("stats", &self.inner.stats.get())
            .finish()
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(PublisherConfig::default())
    }
}

impl Publisher {
    #[must_use]
    pub fn new(config: PublisherConfig) -> Self {
        Self {
            inner: Rc::new(PublisherInner {
                config,
                registrations: RefCell::new(Vec::new()),
                pending: RefCell::new(Event::new()),
                open_rounds: Cell::new(0),
                dispatch_depth: Cell::new(0),
                stats: Cell::new(PublisherStats::default()),
            }),
        }
    }

    /// Whether two handles refer to the same bus.
    #[must_use]
    pub fn ptr_eq(&self, other: &Publisher) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn config(&self) -> &PublisherConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn stats(&self) -> PublisherStats {
        self.inner.stats.get()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register `callback` for `event_type`, optionally only for facts
    /// reported by `source`. Registering the same triple twice is a no-op.
    pub fn register_observer(
        &self,
        callback: &Callback,
        event_type: impl Into<EventType>,
        source: Option<SourceId>,
    ) {
        let event_type = event_type.into();
        let mut regs = self.inner.registrations.borrow_mut();
        let duplicate = regs.iter().any(|r| {
            r.callback.id() == callback.id() && r.event_type == event_type && r.source == source
        });
        if !duplicate {
            trace!(callback = %callback.id(), %event_type, ?source, "register observer");
            regs.push(Registration {
                callback: callback.clone(),
                event_type,
                source,
            });
        }
    }

    /// Remove registrations of `callback`.
    ///
    /// With both `event_type` and `source` only that exact registration is
    /// removed; with one of them, every registration matching it; with
    /// neither, all of the callback's registrations.
    ///
    /// # Errors
    ///
    /// Returns [`FrameworkError::Subscription`] when nothing matched.
    pub fn remove_observer(
        &self,
        callback: CallbackId,
        event_type: Option<&str>,
        source: Option<SourceId>,
    ) -> Result<usize> {
        let mut regs = self.inner.registrations.borrow_mut();
        let before = regs.len();
        regs.retain(|r| {
            let matches = r.callback.id() == callback
                && event_type.is_none_or(|t| r.event_type == *t)
                && source.is_none_or(|s| r.source == Some(s));
            !matches
        });
        let removed = before - regs.len();
        if removed == 0 {
            return Err(FrameworkError::Subscription {
                callback,
                event_type: event_type.map(EventType::from),
            });
        }
        trace!(%callback, removed, "remove observer");
        Ok(removed)
    }

    /// Whether `callback` has at least one registration.
    #[must_use]
    pub fn is_registered(&self, callback: CallbackId) -> bool {
        self.inner
            .registrations
            .borrow()
            .iter()
            .any(|r| r.callback.id() == callback)
    }

    /// Registered callbacks, optionally only those registered for
    /// `event_type`, in registration order without duplicates.
    #[must_use]
    pub fn observers(&self, event_type: Option<&str>) -> Vec<CallbackId> {
        let regs = self.inner.registrations.borrow();
        let mut seen = HashSet::new();
        regs.iter()
            .filter(|r| event_type.is_none_or(|t| r.event_type == *t))
            .map(|r| r.callback.id())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Drop every registration and any pending facts.
    pub fn clear(&self) {
        self.inner.registrations.borrow_mut().clear();
        *self.inner.pending.borrow_mut() = Event::new();
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    /// Record a fact for the current round. Outside a round the fact is
    /// delivered immediately.
    pub fn notify(&self, event_type: impl Into<EventType>, source: SourceId, value: Option<Value>) {
        let _round = self.round();
        let event_type = event_type.into();
        trace!(%event_type, %source, has_value = value.is_some(), "notify");
        self.inner
            .pending
            .borrow_mut()
            .add_source(event_type, source, value);
    }

    /// Open a dispatch round. Rounds nest; the pending event is delivered
    /// when the outermost guard is dropped.
    #[must_use = "the round closes as soon as the guard is dropped"]
    pub fn round(&self) -> Round {
        self.inner.open_rounds.set(self.inner.open_rounds.get() + 1);
        Round {
            publisher: self.clone(),
        }
    }

    /// Run `f` inside a single dispatch round.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _round = self.round();
        f()
    }

    /// Whether a round is currently open.
    #[must_use]
    pub fn in_round(&self) -> bool {
        self.inner.open_rounds.get() > 0
    }

    /// Number of facts waiting for the current round to close.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Deliver the pending event now, even if a round is still open.
    pub fn flush(&self) -> DispatchReport {
        let event = std::mem::take(&mut *self.inner.pending.borrow_mut());
        self.deliver(&event)
    }

    /// Deliver a prebuilt event immediately, bypassing the pending event.
    pub fn send(&self, event: &Event) -> DispatchReport {
        self.deliver(event)
    }

    fn deliver(&self, event: &Event) -> DispatchReport {
        let mut report = DispatchReport::default();
        if event.sources().is_empty() {
            return report;
        }

        let depth = self.inner.dispatch_depth.get();
        if depth >= self.inner.config.max_dispatch_depth {
            warn!(depth, event = ?event, "dispatch depth exceeded; dropping event");
            self.bump(|s| s.dropped += 1);
            report.errors.push(DispatchError::DepthExceeded { depth });
            return report;
        }
        let _depth = DepthGuard::enter(&self.inner.dispatch_depth);

        let targets = self.targets(event);
        debug!(
            types = ?event.types().collect::<Vec<_>>(),
            sources = event.sources().len(),
            observers = targets.len(),
            depth,
            "dispatch round"
        );
        self.bump(|s| s.rounds += 1);

        for Target {
            callback,
            first_type,
            selectors,
        } in targets
        {
            // Unregistered by an earlier callback in this delivery.
            if !self.is_registered(callback.id()) {
                continue;
            }
            let sub_event = event.sub_event(&selectors);
            if self.inner.config.trace_deliveries {
                trace!(
                    callback = %callback.id(),
                    event_type = %first_type,
                    facts = sub_event.len(),
                    "deliver"
                );
            }
            match self.invoke(&callback, &sub_event) {
                Ok(()) => {
                    report.delivered += 1;
                    self.bump(|s| s.deliveries += 1);
                }
                Err(err) => {
                    let err = match err {
                        Invocation::Failed(message) => DispatchError::CallbackFailed {
                            callback: callback.id(),
                            event_type: first_type,
                            message,
                        },
                        Invocation::Panicked(message) => DispatchError::CallbackPanicked {
                            callback: callback.id(),
                            message,
                        },
                    };
                    warn!(error = %err, "observer failed; continuing delivery");
                    self.bump(|s| s.failures += 1);
                    report.errors.push(err);
                }
            }
        }
        report
    }

    /// Callbacks matching `event` in order of their earliest matching
    /// registration, each with every registration of theirs that matched.
    fn targets(&self, event: &Event) -> Vec<Target> {
        let regs = self.inner.registrations.borrow();
        let mut slot: HashMap<CallbackId, usize> = HashMap::new();
        let mut out: Vec<Target> = Vec::new();
        for reg in regs.iter() {
            let matched = match reg.source {
                Some(source) => event.contains(reg.event_type.as_str(), source),
                None => event.has_type(reg.event_type.as_str()),
            };
            if !matched {
                continue;
            }
            let selector = (reg.event_type.clone(), reg.source);
            match slot.get(&reg.callback.id()) {
                Some(&i) => out[i].selectors.push(selector),
                None => {
                    slot.insert(reg.callback.id(), out.len());
                    out.push(Target {
                        callback: reg.callback.clone(),
                        first_type: reg.event_type.clone(),
                        selectors: vec![selector],
                    });
                }
            }
        }
        out
    }

    fn invoke(&self, callback: &Callback, event: &Event) -> std::result::Result<(), Invocation> {
        if !self.inner.config.catch_panics {
            return callback
                .call(event)
                .map_err(|e| Invocation::Failed(e.to_string()));
        }
        match catch_unwind(AssertUnwindSafe(|| callback.call(event))) {
            Ok(result) => result.map_err(|e| Invocation::Failed(e.to_string())),
            Err(payload) => Err(Invocation::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn bump(&self, f: impl FnOnce(&mut PublisherStats)) {
        let mut stats = self.inner.stats.get();
        f(&mut stats);
        self.inner.stats.set(stats);
    }
}

/// One callback due for delivery and the registrations that selected it.
struct Target {
    callback: Callback,
    first_type: EventType,
    selectors: Vec<(EventType, Option<SourceId>)>,
}

enum Invocation {
    Failed(String),
    Panicked(String),
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Restores the dispatch depth even if a callback unwinds.
struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
    saved: usize,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        let saved = depth.get();
        depth.set(saved + 1);
        Self { depth, saved }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.saved);
    }
}

/// RAII guard for an open dispatch round.
///
/// Dropping the outermost guard delivers every fact recorded since it was
/// opened as one [`Event`].
pub struct Round {
    publisher: Publisher,
}

impl fmt::Debug for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Round")
            .field("depth", &self.publisher.inner.open_rounds.get())
            .finish()
    }
}

impl Drop for Round {
    fn drop(&mut self) {
        let inner = &self.publisher.inner;
        let open = inner.open_rounds.get().saturating_sub(1);
        inner.open_rounds.set(open);
        if open > 0 {
            return;
        }
        if std::thread::panicking() {
            let discarded = std::mem::take(&mut *inner.pending.borrow_mut());
            if !discarded.is_empty() {
                warn!(event = ?discarded, "discarding pending event while unwinding");
            }
            return;
        }
        let _ = self.publisher.flush();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
