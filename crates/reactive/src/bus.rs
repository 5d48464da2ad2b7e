//! Trigger bus.
//!
//! `TriggerBus` routes each published trigger to the subscribers whose watched tables
//! intersect the trigger's tables. Subscribers are either callbacks or channels.
//!
//! Callback subscribers own a FIFO queue. Publishing only enqueues under the order lock;
//! callbacks run afterwards, outside every bus lock, and at most one thread drains a
//! given subscriber at a time.

use crate::trigger::Trigger;
use brook_core::{Marker, TableSet};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Unique identifier for a bus subscriber.
pub type SubscriberId = u64;

/// Callback invoked for every matching trigger.
pub type TriggerCallback<M> = Arc<dyn Fn(&Trigger<M>) + Send + Sync>;

struct CallbackSink<M> {
    callback: TriggerCallback<M>,
    queue: Mutex<VecDeque<Trigger<M>>>,
    draining: Mutex<()>,
}

impl<M> CallbackSink<M> {
    fn new(callback: TriggerCallback<M>) -> Self {
        Self {
            callback,
            queue: Mutex::new(VecDeque::new()),
            draining: Mutex::new(()),
        }
    }

    /// Runs queued triggers unless another thread is already doing so. A trigger queued
    /// while the current drainer is finishing is picked up by the re-check.
    fn drain(&self, active: &AtomicBool) {
        loop {
            let Some(guard) = self.draining.try_lock() else {
                return;
            };
            loop {
                let next = self.queue.lock().pop_front();
                match next {
                    Some(trigger) if active.load(Ordering::SeqCst) => (self.callback)(&trigger),
                    Some(_) => {}
                    None => break,
                }
            }
            drop(guard);
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }
}

enum Sink<M> {
    Callback(CallbackSink<M>),
    Channel(mpsc::Sender<Trigger<M>>),
}

struct Subscriber<M> {
    watched: TableSet,
    sink: Sink<M>,
    active: AtomicBool,
}

struct Registry<M> {
    subscribers: HashMap<SubscriberId, Arc<Subscriber<M>>>,
    next_id: SubscriberId,
}

/// Broadcast of trigger events to table-filtered subscribers.
///
/// Every subscriber observes matching triggers in publish order. Callbacks run outside
/// the bus locks, so a subscriber may subscribe, unsubscribe or publish from inside its
/// callback, and a slow callback only holds up its own queue. A publish that finds a
/// subscriber busy on another thread leaves the trigger queued for that thread to run.
///
/// # Example
///
/// ```rust
/// use brook_core::TableSet;
/// use brook_reactive::TriggerBus;
/// use std::sync::Arc;
///
/// let bus = Arc::new(TriggerBus::new());
/// let stream = bus.subscribe_filtered(TableSet::single("employee"));
///
/// bus.publish(TableSet::of(["employee", "manager"]), "m1");
/// bus.publish(TableSet::single("item"), "m2");
///
/// let trigger = stream.try_recv().unwrap();
/// assert_eq!(trigger.marker, "m1");
/// assert!(stream.try_recv().is_none());
/// ```
pub struct TriggerBus<M> {
    registry: Mutex<Registry<M>>,
    publish_order: Mutex<()>,
}

impl<M: Marker> Default for TriggerBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Marker> TriggerBus<M> {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                subscribers: HashMap::new(),
                next_id: 1,
            }),
            publish_order: Mutex::new(()),
        }
    }

    fn register(&self, watched: TableSet, sink: Sink<M>) -> SubscriberId {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.insert(
            id,
            Arc::new(Subscriber {
                watched,
                sink,
                active: AtomicBool::new(true),
            }),
        );
        id
    }

    /// Registers a callback for triggers touching any of `watched`.
    pub fn listen<F>(&self, watched: impl Into<TableSet>, callback: F) -> SubscriberId
    where
        F: Fn(&Trigger<M>) + Send + Sync + 'static,
    {
        let sink = CallbackSink::new(Arc::new(callback));
        self.register(watched.into(), Sink::Callback(sink))
    }

    /// Returns a stream of triggers touching any of `watched`.
    ///
    /// Dropping the stream unsubscribes it.
    pub fn subscribe_filtered(self: &Arc<Self>, watched: impl Into<TableSet>) -> TriggerStream<M> {
        let (tx, rx) = mpsc::channel();
        let id = self.register(watched.into(), Sink::Channel(tx));
        TriggerStream {
            id,
            receiver: rx,
            bus: Arc::clone(self),
        }
    }

    /// Removes a subscriber. Returns true if it was registered.
    ///
    /// Triggers still queued for a removed callback are discarded.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        match self.registry.lock().subscribers.remove(&id) {
            Some(subscriber) => {
                subscriber.active.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Publishes one trigger. Returns the number of subscribers it was queued or sent to.
    pub fn publish(&self, tables: impl Into<TableSet>, marker: M) -> usize {
        let trigger = Trigger::new(tables, marker);

        let mut delivered = 0;
        let mut closed = Vec::new();
        let mut pending = Vec::new();
        {
            let _order = self.publish_order.lock();
            let targets: Vec<(SubscriberId, Arc<Subscriber<M>>)> = self
                .registry
                .lock()
                .subscribers
                .iter()
                .filter(|(_, sub)| trigger.matches(&sub.watched))
                .map(|(id, sub)| (*id, Arc::clone(sub)))
                .collect();

            for (id, subscriber) in targets {
                match &subscriber.sink {
                    Sink::Callback(sink) => {
                        sink.queue.lock().push_back(trigger.clone());
                        delivered += 1;
                        pending.push(subscriber);
                    }
                    Sink::Channel(tx) => {
                        if tx.send(trigger.clone()).is_ok() {
                            delivered += 1;
                        } else {
                            closed.push(id);
                        }
                    }
                }
            }
        }

        for subscriber in &pending {
            if let Sink::Callback(sink) = &subscriber.sink {
                sink.drain(&subscriber.active);
            }
        }

        if !closed.is_empty() {
            let mut registry = self.registry.lock();
            for id in &closed {
                registry.subscribers.remove(id);
            }
            tracing::debug!(
                target: "brook::reactive",
                pruned = closed.len(),
                "removed closed trigger subscribers"
            );
        }
        delivered
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// Returns the number of subscribers watching a specific table.
    pub fn subscribers_for_table(&self, table: &str) -> usize {
        self.registry
            .lock()
            .subscribers
            .values()
            .filter(|sub| sub.watched.contains(table))
            .count()
    }
}

/// Channel end of a filtered bus subscription.
pub struct TriggerStream<M: Marker> {
    id: SubscriberId,
    receiver: mpsc::Receiver<Trigger<M>>,
    bus: Arc<TriggerBus<M>>,
}

impl<M: Marker> TriggerStream<M> {
    /// Returns the subscriber id on the bus.
    #[inline]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Blocks until the next trigger arrives.
    pub fn recv(&self) -> Option<Trigger<M>> {
        self.receiver.recv().ok()
    }

    /// Waits up to `timeout` for the next trigger.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Trigger<M>> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Returns the next trigger if one is already queued.
    pub fn try_recv(&self) -> Option<Trigger<M>> {
        self.receiver.try_recv().ok()
    }

    /// Returns every queued trigger.
    pub fn drain(&self) -> Vec<Trigger<M>> {
        self.receiver.try_iter().collect()
    }
}

impl<M: Marker> Drop for TriggerStream<M> {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}
