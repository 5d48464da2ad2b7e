//! Subscription handles.
//!
//! A `Disposable` is the shared cancellation flag of one subscription chain. A
//! `Subscription` is the consumer's owning handle: dropping it disposes the chain.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Hook = Box<dyn FnOnce() + Send>;

struct DisposeState {
    disposed: AtomicBool,
    hooks: Mutex<Vec<Hook>>,
}

/// Shared cancellation flag with teardown hooks.
#[derive(Clone)]
pub struct Disposable {
    state: Arc<DisposeState>,
}

impl Default for Disposable {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable {
    /// Creates a live disposable.
    pub fn new() -> Self {
        Self {
            state: Arc::new(DisposeState {
                disposed: AtomicBool::new(false),
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns true once `dispose` has been called.
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::SeqCst)
    }

    /// Registers teardown work. Runs it at once if already disposed.
    pub fn add_hook<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut hooks = self.state.hooks.lock();
            if !self.is_disposed() {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Disposes the chain and runs the teardown hooks. Later calls do nothing.
    pub fn dispose(&self) {
        if self.state.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = std::mem::take(&mut *self.state.hooks.lock());
        for hook in hooks {
            hook();
        }
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Owning handle of an active subscription.
///
/// Dropping the handle unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
#[derive(Debug)]
pub struct Subscription {
    disposable: Disposable,
}

impl Subscription {
    /// Wraps a disposable.
    pub fn new(disposable: Disposable) -> Self {
        Self { disposable }
    }

    /// Returns true once the subscription has been cancelled.
    #[inline]
    pub fn is_unsubscribed(&self) -> bool {
        self.disposable.is_disposed()
    }

    /// Cancels the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Returns the shared disposable.
    pub fn disposable(&self) -> &Disposable {
        &self.disposable
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.disposable.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_disposable_runs_hooks_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let disposable = Disposable::new();
        let counter = runs.clone();
        disposable.add_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!disposable.is_disposed());
        disposable.dispose();
        disposable.dispose();
        assert!(disposable.is_disposed());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_after_dispose_runs_immediately() {
        let runs = Arc::new(AtomicUsize::new(0));
        let disposable = Disposable::new();
        disposable.dispose();
        let counter = runs.clone();
        disposable.add_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_drop_disposes() {
        let disposable = Disposable::new();
        let subscription = Subscription::new(disposable.clone());
        assert!(!subscription.is_unsubscribed());
        subscription.unsubscribe();
        assert!(disposable.is_disposed());
    }
}
