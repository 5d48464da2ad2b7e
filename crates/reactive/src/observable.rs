//! Observers and observables.
//!
//! A push-based stream abstraction: an `Observable` accepts an `Observer` and returns a
//! `Subscription`. Observers receive `on_subscribe` first, then any number of `on_next`
//! calls, then at most one of `on_error` or `on_complete`.

use crate::plugins;
use crate::subscription::{Disposable, Subscription};
use brook_core::{Error, Result};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Receiver of stream events.
pub trait Observer<T>: Send + 'static {
    /// Called once, before any other event, with the chain's cancellation handle.
    fn on_subscribe(&mut self, _disposable: Disposable) {}

    /// Called for each item.
    fn on_next(&mut self, item: T);

    /// Called once if the stream fails. No events follow.
    fn on_error(&mut self, error: Error);

    /// Called once if the stream finishes. No events follow.
    fn on_complete(&mut self) {}
}

impl<T, O> Observer<T> for Box<O>
where
    O: Observer<T> + ?Sized,
{
    fn on_subscribe(&mut self, disposable: Disposable) {
        (**self).on_subscribe(disposable)
    }

    fn on_next(&mut self, item: T) {
        (**self).on_next(item)
    }

    fn on_error(&mut self, error: Error) {
        (**self).on_error(error)
    }

    fn on_complete(&mut self) {
        (**self).on_complete()
    }
}

/// A stream that can be subscribed to any number of times.
pub trait Observable: Send + Sync {
    /// Item type emitted by the stream.
    type Item: Send + 'static;

    /// Subscribes an observer.
    ///
    /// Fails without calling the observer if the subscription cannot be established.
    fn subscribe_observer(&self, observer: Box<dyn Observer<Self::Item>>) -> Result<Subscription>;
}

/// Type-erased, shareable observable.
pub type BoxObservable<T> = Arc<dyn Observable<Item = T>>;

impl<O> Observable for Arc<O>
where
    O: Observable + ?Sized,
{
    type Item = O::Item;

    fn subscribe_observer(&self, observer: Box<dyn Observer<Self::Item>>) -> Result<Subscription> {
        (**self).subscribe_observer(observer)
    }
}

/// One event of a stream, as seen through a channel.
#[derive(Debug)]
pub enum Notification<T> {
    /// An item.
    Next(T),
    /// The stream failed.
    Error(Error),
    /// The stream finished.
    Complete,
}

impl<T> Notification<T> {
    /// Returns the item, if this is `Next`.
    pub fn into_next(self) -> Option<T> {
        match self {
            Notification::Next(item) => Some(item),
            _ => None,
        }
    }

    /// Returns the error, if this is `Error`.
    pub fn into_error(self) -> Option<Error> {
        match self {
            Notification::Error(error) => Some(error),
            _ => None,
        }
    }
}

struct ChannelObserver<T> {
    sender: mpsc::Sender<Notification<T>>,
}

impl<T: Send + 'static> Observer<T> for ChannelObserver<T> {
    fn on_next(&mut self, item: T) {
        let _ = self.sender.send(Notification::Next(item));
    }

    fn on_error(&mut self, error: Error) {
        if let Err(mpsc::SendError(Notification::Error(error))) =
            self.sender.send(Notification::Error(error))
        {
            plugins::report_error(error);
        }
    }

    fn on_complete(&mut self) {
        let _ = self.sender.send(Notification::Complete);
    }
}

/// A subscription whose events are queued on a channel.
pub struct Subscriber<T> {
    receiver: mpsc::Receiver<Notification<T>>,
    subscription: Subscription,
}

impl<T> Subscriber<T> {
    /// Blocks until the next event.
    pub fn recv(&self) -> Option<Notification<T>> {
        self.receiver.recv().ok()
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification<T>> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&self) -> Option<Notification<T>> {
        self.receiver.try_recv().ok()
    }

    /// Returns every queued event.
    pub fn drain(&self) -> Vec<Notification<T>> {
        self.receiver.try_iter().collect()
    }

    /// Returns true once the subscription has been cancelled.
    pub fn is_unsubscribed(&self) -> bool {
        self.subscription.is_unsubscribed()
    }

    /// Cancels the subscription.
    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}

struct FnObserver<F> {
    on_next: F,
}

impl<T, F> Observer<T> for FnObserver<F>
where
    F: FnMut(T) + Send + 'static,
{
    fn on_next(&mut self, item: T) {
        (self.on_next)(item)
    }

    fn on_error(&mut self, error: Error) {
        plugins::report_error(error);
    }
}

/// Convenience methods for every observable.
pub trait ObservableExt: Observable + Sized {
    /// Subscribes a concrete observer.
    fn subscribe_with<O>(&self, observer: O) -> Result<Subscription>
    where
        O: Observer<Self::Item>,
    {
        self.subscribe_observer(Box::new(observer))
    }

    /// Subscribes a channel and returns its receiving end.
    fn subscribe_channel(&self) -> Result<Subscriber<Self::Item>> {
        let (sender, receiver) = mpsc::channel();
        let subscription = self.subscribe_observer(Box::new(ChannelObserver { sender }))?;
        Ok(Subscriber {
            receiver,
            subscription,
        })
    }

    /// Subscribes a closure for items. Errors go to the fallback error handler.
    fn subscribe_next<F>(&self, on_next: F) -> Result<Subscription>
    where
        F: FnMut(Self::Item) + Send + 'static,
    {
        self.subscribe_observer(Box::new(FnObserver { on_next }))
    }

    /// Drops the first `count` items.
    fn skip(self, count: usize) -> Skip<Self> {
        Skip {
            source: self,
            count,
        }
    }

    /// Transforms every item.
    fn map<F, U>(self, f: F) -> Map<Self, F>
    where
        F: Fn(Self::Item) -> U + Send + Sync + 'static,
        U: Send + 'static,
    {
        Map {
            source: self,
            f: Arc::new(f),
        }
    }

    /// Erases the observable's type.
    fn boxed(self) -> BoxObservable<Self::Item>
    where
        Self: 'static,
    {
        Arc::new(self)
    }
}

impl<O: Observable> ObservableExt for O {}

/// Emits a fixed sequence of items, then completes.
pub struct Just<T> {
    items: Vec<T>,
}

impl<T> Just<T> {
    /// Creates an observable over `items`.
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }
}

impl<T> Observable for Just<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    fn subscribe_observer(&self, mut observer: Box<dyn Observer<T>>) -> Result<Subscription> {
        let disposable = Disposable::new();
        observer.on_subscribe(disposable.clone());
        for item in &self.items {
            if disposable.is_disposed() {
                return Ok(Subscription::new(disposable));
            }
            observer.on_next(item.clone());
        }
        if !disposable.is_disposed() {
            observer.on_complete();
        }
        Ok(Subscription::new(disposable))
    }
}

/// See [`ObservableExt::skip`].
pub struct Skip<O> {
    source: O,
    count: usize,
}

struct SkipObserver<T> {
    downstream: Box<dyn Observer<T>>,
    remaining: usize,
}

impl<T: Send + 'static> Observer<T> for SkipObserver<T> {
    fn on_subscribe(&mut self, disposable: Disposable) {
        self.downstream.on_subscribe(disposable);
    }

    fn on_next(&mut self, item: T) {
        if self.remaining > 0 {
            self.remaining -= 1;
            return;
        }
        self.downstream.on_next(item);
    }

    fn on_error(&mut self, error: Error) {
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        self.downstream.on_complete();
    }
}

impl<O: Observable> Observable for Skip<O> {
    type Item = O::Item;

    fn subscribe_observer(&self, observer: Box<dyn Observer<Self::Item>>) -> Result<Subscription> {
        self.source.subscribe_observer(Box::new(SkipObserver {
            downstream: observer,
            remaining: self.count,
        }))
    }
}

/// See [`ObservableExt::map`].
pub struct Map<O, F> {
    source: O,
    f: Arc<F>,
}

struct MapObserver<T, U, F> {
    downstream: Box<dyn Observer<U>>,
    f: Arc<F>,
    _item: std::marker::PhantomData<fn(T)>,
}

impl<T, U, F> Observer<T> for MapObserver<T, U, F>
where
    T: 'static,
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    fn on_subscribe(&mut self, disposable: Disposable) {
        self.downstream.on_subscribe(disposable);
    }

    fn on_next(&mut self, item: T) {
        let mapped = (self.f)(item);
        self.downstream.on_next(mapped);
    }

    fn on_error(&mut self, error: Error) {
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        self.downstream.on_complete();
    }
}

impl<O, F, U> Observable for Map<O, F>
where
    O: Observable,
    F: Fn(O::Item) -> U + Send + Sync + 'static,
    U: Send + 'static,
{
    type Item = U;

    fn subscribe_observer(&self, observer: Box<dyn Observer<U>>) -> Result<Subscription> {
        self.source.subscribe_observer(Box::new(MapObserver {
            downstream: observer,
            f: Arc::clone(&self.f),
            _item: std::marker::PhantomData,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_just_emits_then_completes() {
        let subscriber = Just::new(vec![1, 2, 3]).subscribe_channel().unwrap();
        let events = subscriber.drain();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], Notification::Next(1)));
        assert!(matches!(events[3], Notification::Complete));
    }

    #[test]
    fn test_skip_and_map() {
        let subscriber = Just::new(vec![1, 2, 3])
            .skip(1)
            .map(|n| n * 10)
            .subscribe_channel()
            .unwrap();
        let items: Vec<i32> = subscriber
            .drain()
            .into_iter()
            .filter_map(Notification::into_next)
            .collect();
        assert_eq!(items, vec![20, 30]);
    }

    #[test]
    fn test_boxed_observable_is_reusable() {
        let observable: BoxObservable<&str> = Just::new(vec!["a"]).boxed();
        let first = observable.subscribe_channel().unwrap();
        let second = observable.subscribe_channel().unwrap();
        assert!(matches!(first.try_recv(), Some(Notification::Next("a"))));
        assert!(matches!(second.try_recv(), Some(Notification::Next("a"))));
    }

    #[test]
    fn test_subscribe_next_collects_items() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = Just::new(vec!['x', 'y'])
            .subscribe_next(move |c| sink.lock().push(c))
            .unwrap();
        assert_eq!(*seen.lock(), vec!['x', 'y']);
    }
}
