//! Brook Reactive - Trigger bus, observables and mapping operators.
//!
//! This crate implements the notification side of Brook: writers publish triggers
//! naming the tables they changed, and subscribers watching any of those tables are
//! told to re-run their query.
//!
//! # Core Concepts
//!
//! - `TriggerBus`: Routes `Trigger`s to subscribers by table-set intersection
//! - `Scheduler`: Ordering domain items are delivered on (`ImmediateScheduler`, `WorkerScheduler`)
//! - `Observable` / `Observer`: Push-based streams with cancellable `Subscription`s
//! - `Query`: A lazily evaluated read
//! - `QueryMappingExt`: `map_to_list`, `map_to_one`, `map_to_one_or_default`,
//!   `map_to_optional` and `map_to_specific_list`
//! - `plugins`: Fallback handler for errors no subscriber can receive
//!
//! # Example
//!
//! ```rust
//! use brook_core::TableSet;
//! use brook_reactive::TriggerBus;
//! use std::sync::Arc;
//!
//! let bus = Arc::new(TriggerBus::new());
//! let stream = bus.subscribe_filtered(TableSet::of(["employee", "manager"]));
//!
//! bus.publish("manager", 42u32);
//! assert_eq!(stream.try_recv().unwrap().marker, 42);
//! ```

pub mod bus;
pub mod mapping;
pub mod observable;
pub mod plugins;
pub mod scheduler;
pub mod subscription;
pub mod trigger;

pub use bus::{SubscriberId, TriggerBus, TriggerCallback, TriggerStream};
pub use mapping::{CursorGuard, CursorMapping, Mapped, Query, QueryMappingExt};
pub use observable::{
    BoxObservable, Just, Notification, Observable, ObservableExt, Observer, Subscriber,
};
pub use scheduler::{ImmediateScheduler, Scheduler, Task, WorkerScheduler};
pub use subscription::{Disposable, Subscription};
pub use trigger::Trigger;

// Re-export commonly used types from dependencies
pub use brook_core::{Error, Marker, Result, Row, TableSet};
