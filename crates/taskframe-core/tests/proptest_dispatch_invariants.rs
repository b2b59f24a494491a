//! Property-based invariant tests for round aggregation and delivery.
//!
//! 1. One round delivers at most one call per callback, however many of its
//!    registrations match.
//! 2. The delivered event holds the last value reported per (type, source).
//! 3. Source-filtered callbacks run iff their source reported their type,
//!    and see only that source's fact.
//! 4. A failing callback never prevents later callbacks from running.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use proptest::prelude::*;
use taskframe_core::{Callback, Event, ObserverError, Publisher, SourceId};

const TYPES: [&str; 3] = ["Task.subject", "Task.priority", "Task.noteAdded"];

// ── Strategy helpers ──────────────────────────────────────────────────

/// (type index, source index, value) facts for one round.
fn arb_facts() -> impl Strategy<Value = Vec<(usize, usize, i64)>> {
    prop::collection::vec((0usize..3, 0usize..4, any::<i64>()), 0..24)
}

fn recorder() -> (Callback, Rc<RefCell<Vec<Event>>>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    (
        Callback::from_fn(move |e| sink.borrow_mut().push(e.clone())),
        log,
    )
}

proptest! {
    #[test]
    fn one_call_per_callback_per_round(facts in arb_facts()) {
        let publisher = Publisher::default();
        let sources: Vec<SourceId> = (0..4).map(|_| SourceId::next()).collect();
        let (cb, log) = recorder();
        for t in TYPES {
            publisher.register_observer(&cb, t, None);
        }

        {
            let _round = publisher.round();
            for (t, s, v) in &facts {
                publisher.notify(TYPES[*t], sources[*s], Some(Rc::new(*v)));
            }
        }

        let expected_calls = usize::from(!facts.is_empty());
        prop_assert_eq!(log.borrow().len(), expected_calls);
    }

    #[test]
    fn last_report_wins(facts in arb_facts()) {
        let publisher = Publisher::default();
        let sources: Vec<SourceId> = (0..4).map(|_| SourceId::next()).collect();
        let (cb, log) = recorder();
        for t in TYPES {
            publisher.register_observer(&cb, t, None);
        }

        let mut expected = BTreeMap::new();
        publisher.batch(|| {
            for (t, s, v) in &facts {
                publisher.notify(TYPES[*t], sources[*s], Some(Rc::new(*v)));
                expected.insert((*t, *s), *v);
            }
        });

        if let Some(event) = log.borrow().first() {
            for ((t, s), v) in &expected {
                prop_assert_eq!(event.value::<i64>(sources[*s], TYPES[*t]), Some(v));
            }
            prop_assert_eq!(event.len(), expected.len());
        }
    }

    #[test]
    fn source_filter_matches_exactly(facts in arb_facts(), watched in 0usize..4, ty in 0usize..3) {
        let publisher = Publisher::default();
        let sources: Vec<SourceId> = (0..4).map(|_| SourceId::next()).collect();
        let (cb, log) = recorder();
        publisher.register_observer(&cb, TYPES[ty], Some(sources[watched]));

        publisher.batch(|| {
            for (t, s, v) in &facts {
                publisher.notify(TYPES[*t], sources[*s], Some(Rc::new(*v)));
            }
        });

        let reported = facts.iter().any(|(t, s, _)| *t == ty && *s == watched);
        prop_assert_eq!(log.borrow().len(), usize::from(reported));
        if let Some(event) = log.borrow().first() {
            prop_assert_eq!(event.sources(), BTreeSet::from([sources[watched]]));
            prop_assert_eq!(event.len(), 1);
        }
    }

    #[test]
    fn failures_are_isolated(failing in prop::collection::vec(any::<bool>(), 1..8)) {
        let publisher = Publisher::default();
        let source = SourceId::next();
        let calls = Rc::new(RefCell::new(0usize));
        let callbacks: Vec<Callback> = failing
            .iter()
            .map(|fail| {
                let (fail, calls) = (*fail, Rc::clone(&calls));
                Callback::new(move |_| {
                    *calls.borrow_mut() += 1;
                    if fail {
                        Err(ObserverError::new("observer rejected event"))
                    } else {
                        Ok(())
                    }
                })
            })
            .collect();
        for cb in &callbacks {
            publisher.register_observer(cb, "Task.subject", None);
        }

        let report = publisher.send(&Event::with_source("Task.subject", source, None));
        prop_assert_eq!(*calls.borrow(), failing.len());
        prop_assert_eq!(report.errors.len(), failing.iter().filter(|f| **f).count());
        prop_assert_eq!(report.delivered, failing.iter().filter(|f| !**f).count());
    }
}
