//! Nested storage transactions.
//!
//! Nesting is logical: only the outermost level issues `BEGIN`/`COMMIT`/`ROLLBACK`. A
//! nested level that ends without being marked successful poisons its parent, so the
//! outermost level rolls back even if it was marked.

use brook_core::{Error, Result};
use std::sync::Arc;

/// How the outermost level of a transaction acquires the database.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransactionMode {
    /// `BEGIN EXCLUSIVE`: no other connection may read or write.
    #[default]
    Exclusive,
    /// `BEGIN IMMEDIATE`: other connections may still read.
    Immediate,
}

impl TransactionMode {
    /// Statement that opens an outermost transaction in this mode.
    pub fn begin_sql(&self) -> &'static str {
        match self {
            TransactionMode::Exclusive => "BEGIN EXCLUSIVE;",
            TransactionMode::Immediate => "BEGIN IMMEDIATE;",
        }
    }
}

/// Callbacks for the lifecycle of one transaction level.
pub trait TransactionListener: Send + Sync {
    /// Called when the level begins, and again after a yield restarts it.
    fn on_begin(&self);

    /// Called when the level ends successfully, or is committed by a yield.
    fn on_commit(&self);

    /// Called when the level ends without being marked successful.
    fn on_rollback(&self);
}

struct Level {
    mode: TransactionMode,
    listener: Arc<dyn TransactionListener>,
    marked_successful: bool,
    child_failed: bool,
}

/// Outcome of popping a level.
pub struct EndedLevel {
    /// Listener registered when the level began.
    pub listener: Arc<dyn TransactionListener>,
    /// True if the level was marked and none of its children failed.
    pub successful: bool,
    /// True if this was the outermost level.
    pub outermost: bool,
}

impl EndedLevel {
    /// Notifies the listener of the outcome.
    pub fn notify(&self) {
        if self.successful {
            self.listener.on_commit();
        } else {
            self.listener.on_rollback();
        }
    }
}

/// Stack of open transaction levels on one connection.
#[derive(Default)]
pub struct TransactionStack {
    levels: Vec<Level>,
}

impl TransactionStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open levels.
    #[inline]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Returns true if no level is open.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Mode of the outermost level.
    pub fn outer_mode(&self) -> Option<TransactionMode> {
        self.levels.first().map(|level| level.mode)
    }

    /// Pushes a new level.
    pub fn push(&mut self, mode: TransactionMode, listener: Arc<dyn TransactionListener>) {
        self.levels.push(Level {
            mode,
            listener,
            marked_successful: false,
            child_failed: false,
        });
    }

    /// Marks the innermost level successful.
    pub fn mark_successful(&mut self) -> Result<()> {
        let level = self
            .levels
            .last_mut()
            .ok_or_else(|| Error::state("Cannot perform this operation because there is no current transaction."))?;
        if level.marked_successful {
            return Err(Error::state(
                "Cannot perform this operation because the transaction has already been marked successful.",
            ));
        }
        level.marked_successful = true;
        Ok(())
    }

    /// Returns true if the innermost level has been marked successful.
    pub fn is_marked(&self) -> bool {
        self.levels.last().map_or(false, |level| level.marked_successful)
    }

    /// Pops the innermost level and propagates a failure to its parent.
    pub fn pop(&mut self) -> Result<EndedLevel> {
        let level = self
            .levels
            .pop()
            .ok_or_else(|| Error::state("Cannot perform this operation because there is no current transaction."))?;
        let successful = level.marked_successful && !level.child_failed;
        if let Some(parent) = self.levels.last_mut() {
            if !successful {
                parent.child_failed = true;
            }
        }
        Ok(EndedLevel {
            listener: level.listener,
            successful,
            outermost: self.levels.is_empty(),
        })
    }

    /// Checks that the stack can yield: exactly one level, not yet marked, no failed child.
    pub fn check_yieldable(&self) -> Result<()> {
        match self.levels.as_slice() {
            [] => Err(Error::state(
                "Cannot perform this operation because there is no current transaction.",
            )),
            [level] if level.marked_successful => Err(Error::state(
                "Cannot perform this operation because the transaction has already been marked successful.",
            )),
            [level] if level.child_failed => Err(Error::state(
                "Cannot yield a transaction whose nested transaction failed.",
            )),
            [_] => Ok(()),
            _ => Err(Error::state("Cannot yield a nested transaction.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        begins: AtomicUsize,
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    impl TransactionListener for Counting {
        fn on_begin(&self) {
            self.begins.fetch_add(1, Ordering::SeqCst);
        }
        fn on_commit(&self) {
            self.commits.fetch_add(1, Ordering::SeqCst);
        }
        fn on_rollback(&self) {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_mark_and_pop() {
        let listener = Arc::new(Counting::default());
        let mut stack = TransactionStack::new();
        stack.push(TransactionMode::Exclusive, listener.clone());
        stack.mark_successful().unwrap();

        let ended = stack.pop().unwrap();
        assert!(ended.successful);
        assert!(ended.outermost);
        ended.notify();
        assert_eq!(listener.commits.load(Ordering::SeqCst), 1);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_double_mark_is_state_error() {
        let mut stack = TransactionStack::new();
        stack.push(TransactionMode::Immediate, Arc::new(Counting::default()));
        stack.mark_successful().unwrap();
        assert!(stack.mark_successful().unwrap_err().is_state());
    }

    #[test]
    fn test_failed_child_poisons_parent() {
        let mut stack = TransactionStack::new();
        stack.push(TransactionMode::Exclusive, Arc::new(Counting::default()));
        stack.push(TransactionMode::Exclusive, Arc::new(Counting::default()));

        let inner = stack.pop().unwrap();
        assert!(!inner.successful);
        assert!(!inner.outermost);

        stack.mark_successful().unwrap();
        let outer = stack.pop().unwrap();
        assert!(!outer.successful);
    }

    #[test]
    fn test_pop_empty_is_state_error() {
        let mut stack = TransactionStack::new();
        assert!(stack.pop().is_err());
        assert!(stack.mark_successful().is_err());
    }

    #[test]
    fn test_check_yieldable() {
        let mut stack = TransactionStack::new();
        assert!(stack.check_yieldable().is_err());

        stack.push(TransactionMode::Exclusive, Arc::new(Counting::default()));
        assert!(stack.check_yieldable().is_ok());

        stack.push(TransactionMode::Exclusive, Arc::new(Counting::default()));
        assert!(stack.check_yieldable().is_err());
        stack.pop().unwrap();

        stack.mark_successful().unwrap();
        assert!(stack.check_yieldable().is_err());
    }

    #[test]
    fn test_begin_sql() {
        assert_eq!(TransactionMode::Exclusive.begin_sql(), "BEGIN EXCLUSIVE;");
        assert_eq!(TransactionMode::Immediate.begin_sql(), "BEGIN IMMEDIATE;");
    }
}
