#![forbid(unsafe_code)]

//! Core: events, the publish/subscribe bus, and observer registration.
//!
//! # Role in Taskframe
//! `taskframe-core` is the notification layer. Every domain object,
//! collection, and command in `taskframe-runtime` reports its changes here,
//! and every viewer or tracker subscribes here.
//!
//! # Primary responsibilities
//! - **Event**: one dispatch round's aggregated `(type, source, value)` facts.
//! - **Publisher**: synchronous bus that merges a round's facts and delivers
//!   them once per matching callback, isolating observer failures.
//! - **Observer**: registration tracker that unregisters on drop.
//! - **Callback**: identity-carrying observer closure, plus the legacy
//!   `(value, sender)` adapter.
//!
//! # Threading
//! Single-threaded and synchronous. Handles are `Rc`-based and `!Send`;
//! producers on other threads must hand their changes to the owning thread
//! before publishing.

pub mod callback;
pub mod error;
pub mod event;
pub mod id;
pub mod logging;
pub mod observer;
pub mod publisher;

pub use callback::{Callback, ObserverResult, legacy};
pub use error::{DispatchError, FrameworkError, ObserverError, Result};
pub use event::{Event, EventType, Value};
pub use id::{CallbackId, SourceId};
pub use observer::Observer;
pub use publisher::{DispatchReport, Publisher, PublisherConfig, PublisherStats, Round};
