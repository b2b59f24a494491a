#![forbid(unsafe_code)]

//! Aggregated change events.
//!
//! An [`Event`] collects every `(event type, source, value)` fact reported
//! during one dispatch round. Observers receive the whole aggregate once, no
//! matter how many of their registrations it matches.
//!
//! # Invariants
//!
//! 1. At most one value per `(type, source)` pair: a later report for the
//!    same pair overwrites the earlier one.
//! 2. Sources are identities ([`SourceId`]); two sources with equal contents
//!    are still distinct.
//! 3. Iteration over types and sources is ordered (type name, then source
//!    allocation order), so delivery and assertions are deterministic.

use std::any::Any;
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::id::SourceId;

/// Category of change, e.g. `"Task.noteAdded"`.
///
/// Cloning is cheap (shared string).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventType(Arc<str>);

impl EventType {
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&EventType> for EventType {
    fn from(t: &EventType) -> Self {
        t.clone()
    }
}

impl Borrow<str> for EventType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for EventType {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for EventType {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// A type-erased payload attached to a fact.
///
/// Collections report a `Vec<T>` of the affected items.
pub type Value = Rc<dyn Any>;

type SourceValues = BTreeMap<SourceId, Option<Value>>;

/// One dispatch round's aggregated facts.
#[derive(Clone, Default)]
pub struct Event {
    by_type: BTreeMap<EventType, SourceValues>,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (t, sources) in &self.by_type {
            let ids: Vec<u64> = sources.keys().map(|s| s.raw()).collect();
            map.entry(t, &ids);
        }
        map.finish()
    }
}

impl Event {
    /// An empty event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An event holding a single fact.
    #[must_use]
    pub fn with_source(
        event_type: impl Into<EventType>,
        source: SourceId,
        value: Option<Value>,
    ) -> Self {
        let mut event = Self::new();
        event.add_source(event_type, source, value);
        event
    }

    /// Record a fact. Overwrites any value already recorded for the same
    /// `(type, source)` pair.
    pub fn add_source(
        &mut self,
        event_type: impl Into<EventType>,
        source: SourceId,
        value: Option<Value>,
    ) {
        self.by_type
            .entry(event_type.into())
            .or_default()
            .insert(source, value);
    }

    /// Merge all facts of `other` into `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: Event) {
        for (t, sources) in other.by_type {
            let entry = self.by_type.entry(t).or_default();
            for (source, value) in sources {
                entry.insert(source, value);
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Total number of recorded facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.values().map(BTreeMap::len).sum()
    }

    /// All event types present.
    pub fn types(&self) -> impl Iterator<Item = &EventType> {
        self.by_type.keys()
    }

    /// The first event type, for single-type events.
    #[must_use]
    pub fn event_type(&self) -> Option<&EventType> {
        self.by_type.keys().next()
    }

    #[must_use]
    pub fn has_type(&self, event_type: &str) -> bool {
        self.by_type.contains_key(event_type)
    }

    /// Distinct sources across every type.
    #[must_use]
    pub fn sources(&self) -> BTreeSet<SourceId> {
        self.by_type
            .values()
            .flat_map(|sources| sources.keys().copied())
            .collect()
    }

    /// Sources that reported under `event_type`.
    #[must_use]
    pub fn sources_of(&self, event_type: &str) -> BTreeSet<SourceId> {
        self.by_type
            .get(event_type)
            .map(|sources| sources.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `source` reported under `event_type`.
    #[must_use]
    pub fn contains(&self, event_type: &str, source: SourceId) -> bool {
        self.by_type
            .get(event_type)
            .is_some_and(|sources| sources.contains_key(&source))
    }

    /// The untyped value `source` reported under `event_type`.
    #[must_use]
    pub fn raw_value(&self, source: SourceId, event_type: &str) -> Option<&Value> {
        self.by_type.get(event_type)?.get(&source)?.as_ref()
    }

    /// The value `source` reported under `event_type`, if it is a `V`.
    #[must_use]
    pub fn value<V: Any>(&self, source: SourceId, event_type: &str) -> Option<&V> {
        self.raw_value(source, event_type)?.downcast_ref::<V>()
    }

    /// Items reported by a collection source. Empty when the fact is missing
    /// or carries a different payload.
    #[must_use]
    pub fn items<T: Any>(&self, source: SourceId, event_type: &str) -> &[T] {
        self.value::<Vec<T>>(source, event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The full `type -> source -> value` mapping.
    #[must_use]
    pub fn sources_and_values_by_type(&self) -> &BTreeMap<EventType, SourceValues> {
        &self.by_type
    }

    /// Restrict the event to the given `(type, source filter)` pairs.
    ///
    /// A `None` filter keeps every source of that type.
    #[must_use]
    pub fn sub_event(&self, selectors: &[(EventType, Option<SourceId>)]) -> Event {
        let mut sub = Event::new();
        for (t, filter) in selectors {
            let Some(sources) = self.by_type.get(t) else {
                continue;
            };
            for (source, value) in sources {
                if filter.is_none_or(|f| f == *source) {
                    sub.add_source(t.clone(), *source, value.clone());
                }
            }
        }
        sub
    }
}
