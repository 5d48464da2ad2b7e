//! Transactions.
//!
//! Each open transaction is backed by a `Frame` on its thread's frame stack. Writes made
//! while a frame is on top add their tables to it instead of publishing. When the frame
//! ends committed with a marker, its tables are handed to the enclosing frame, or
//! published if it was the outermost one.

use crate::database::Shared;
use brook_core::{ConflictAlgorithm, ContentValues, Error, Marker, Result, TableSet, Value};
use brook_reactive::plugins;
use brook_storage::{RowCursor, TransactionListener, TransactionMode};
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Per-transaction bookkeeping: tables written and the outcome reported by storage.
pub(crate) struct Frame<M> {
    label: String,
    depth: usize,
    pending: Mutex<TableSet>,
    committed: AtomicBool,
    marker: Mutex<Option<M>>,
}

impl<M: Marker> Frame<M> {
    pub(crate) fn new(parent: Option<&Frame<M>>) -> Self {
        let id = NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed);
        let (label, depth) = match parent {
            Some(parent) => (format!("{:08x} [{}]", id, parent.label), parent.depth + 1),
            None => (format!("{:08x}", id), 1),
        };
        Self {
            label,
            depth,
            pending: Mutex::new(TableSet::new()),
            committed: AtomicBool::new(false),
            marker: Mutex::new(None),
        }
    }

    #[inline]
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn add_tables(&self, tables: &TableSet) {
        self.pending.lock().extend_from(tables);
    }

    pub(crate) fn is_marked(&self) -> bool {
        self.marker.lock().is_some()
    }

    fn set_marker(&self, marker: M) {
        *self.marker.lock() = Some(marker);
    }

    /// Tables and marker to forward once the frame has ended, if it committed.
    fn take_outcome(&self) -> Option<(TableSet, M)> {
        if !self.committed.load(Ordering::SeqCst) {
            return None;
        }
        let marker = self.marker.lock().clone()?;
        let tables = self.pending.lock().take();
        if tables.is_empty() {
            None
        } else {
            Some((tables, marker))
        }
    }
}

impl<M: Marker> TransactionListener for Frame<M> {
    fn on_begin(&self) {
        self.committed.store(false, Ordering::SeqCst);
    }

    fn on_commit(&self) {
        self.committed.store(true, Ordering::SeqCst);
    }

    fn on_rollback(&self) {
        self.committed.store(false, Ordering::SeqCst);
    }
}

impl<M> fmt::Display for Frame<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// An open transaction on the calling thread.
///
/// Call [`mark_successful`](Transaction::mark_successful) and then
/// [`end`](Transaction::end) to commit. Ending without marking rolls back, and so does
/// dropping the handle. Nested transactions borrow their parent, so they always end
/// first.
///
/// A transaction belongs to the thread that began it and cannot be sent elsewhere.
pub struct Transaction<'a, M: Marker> {
    shared: &'a Shared<M>,
    frame: Arc<Frame<M>>,
    ended: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl<'a, M: Marker> Transaction<'a, M> {
    pub(crate) fn begin(shared: &'a Shared<M>, mode: TransactionMode) -> Result<Self> {
        let frame = shared.begin(mode)?;
        Ok(Self {
            shared,
            frame,
            ended: false,
            _thread_bound: PhantomData,
        })
    }

    /// Nesting level: 1 for an outermost transaction.
    #[inline]
    pub fn depth(&self) -> usize {
        self.frame.depth()
    }

    /// Returns true once `mark_successful` has been called.
    pub fn is_marked(&self) -> bool {
        self.frame.is_marked()
    }

    /// Marks the transaction successful. `marker` is attached to the notification sent
    /// for its writes once they are committed.
    ///
    /// No further writes are allowed through this transaction afterwards.
    pub fn mark_successful(&mut self, marker: M) -> Result<()> {
        if self.frame.is_marked() {
            return Err(Error::state("Transaction already marked successful."));
        }
        self.shared.storage.set_transaction_successful()?;
        self.shared
            .log(|| format!("TXN SUCCESS {:?}, {}", marker, self.frame));
        self.frame.set_marker(marker);
        Ok(())
    }

    /// Ends the transaction, committing it if it was marked successful.
    pub fn end(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        self.ended = true;
        self.shared.pop_frame(&self.frame)?;
        self.shared.log(|| format!("TXN END {}", self.frame));
        self.shared.storage.end_transaction()?;

        if let Some((tables, marker)) = self.frame.take_outcome() {
            self.shared.send_table_trigger(tables, marker);
        }
        Ok(())
    }

    /// Briefly commits and restarts the transaction if another thread is waiting for
    /// storage. Returns true if it yielded.
    ///
    /// Only an outermost transaction that has not been marked successful can yield.
    ///
    /// Storage commits everything written so far, but the tables stay pending on the
    /// transaction. They are notified, with its marker, only if it later ends marked
    /// successful; ending it unmarked announces nothing for rows the yield already
    /// committed.
    pub fn yield_if_contended_safely(&mut self, sleep_after_yield: Option<Duration>) -> Result<bool> {
        if self.depth() > 1 {
            return Err(Error::state("Cannot yield a nested transaction."));
        }
        if self.frame.is_marked() {
            return Err(Error::state(
                "Cannot yield a transaction that was already marked successful.",
            ));
        }
        self.shared.storage.yield_if_contended_safely(sleep_after_yield)
    }

    /// Begins an exclusive transaction nested in this one.
    pub fn new_transaction(&mut self) -> Result<Transaction<'_, M>> {
        Transaction::begin(self.shared, TransactionMode::Exclusive)
    }

    /// Begins a non-exclusive transaction nested in this one.
    pub fn new_non_exclusive_transaction(&mut self) -> Result<Transaction<'_, M>> {
        Transaction::begin(self.shared, TransactionMode::Immediate)
    }

    /// See [`Database::query`](crate::Database::query).
    pub fn query(&self, sql: &str, args: &[Value]) -> Result<Option<Box<dyn RowCursor>>> {
        self.shared.query(sql, args)
    }

    /// See [`Database::insert`](crate::Database::insert).
    pub fn insert(
        &self,
        table: &str,
        marker: M,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
    ) -> Result<i64> {
        self.shared.insert(table, marker, conflict, values)
    }

    /// See [`Database::update`](crate::Database::update).
    pub fn update(
        &self,
        table: &str,
        marker: M,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize> {
        self.shared
            .update(table, marker, conflict, values, where_clause, where_args)
    }

    /// See [`Database::delete`](crate::Database::delete).
    pub fn delete(
        &self,
        table: &str,
        marker: M,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize> {
        self.shared.delete(table, marker, where_clause, where_args)
    }

    /// See [`Database::execute`](crate::Database::execute).
    pub fn execute(&self, sql: &str, args: &[Value]) -> Result<()> {
        self.shared.execute(sql, args)
    }

    /// See [`Database::execute_and_trigger`](crate::Database::execute_and_trigger).
    pub fn execute_and_trigger(
        &self,
        tables: impl Into<TableSet>,
        marker: M,
        sql: &str,
        args: &[Value],
    ) -> Result<()> {
        self.shared
            .execute_and_trigger(tables.into(), marker, sql, args)
    }

    /// See [`Database::execute_update_delete`](crate::Database::execute_update_delete).
    pub fn execute_update_delete(
        &self,
        tables: impl Into<TableSet>,
        marker: M,
        sql: &str,
        args: &[Value],
    ) -> Result<usize> {
        self.shared
            .execute_update_delete(tables.into(), marker, sql, args)
    }

    /// See [`Database::execute_insert`](crate::Database::execute_insert).
    pub fn execute_insert(
        &self,
        tables: impl Into<TableSet>,
        marker: M,
        sql: &str,
        args: &[Value],
    ) -> Result<i64> {
        self.shared
            .execute_insert(tables.into(), marker, sql, args)
    }
}

impl<M: Marker> Drop for Transaction<'_, M> {
    fn drop(&mut self) {
        if !self.ended {
            if let Err(error) = self.finish() {
                plugins::report_error(error);
            }
        }
    }
}

impl<M: Marker> fmt::Debug for Transaction<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("frame", &self.frame.label)
            .field("depth", &self.frame.depth)
            .field("marked", &self.frame.is_marked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_labels_chain_parents() {
        let outer: Frame<u8> = Frame::new(None);
        let inner = Frame::new(Some(&outer));
        assert_eq!(outer.depth(), 1);
        assert_eq!(inner.depth(), 2);
        assert_eq!(outer.to_string().len(), 8);
        assert!(inner.to_string().ends_with(&format!("[{}]", outer)));
    }

    #[test]
    fn test_outcome_requires_commit_marker_and_tables() {
        let frame: Frame<&str> = Frame::new(None);
        frame.add_tables(&TableSet::single("employee"));
        frame.set_marker("m");
        assert!(frame.take_outcome().is_none());

        frame.on_commit();
        let (tables, marker) = frame.take_outcome().unwrap();
        assert!(tables.contains("employee"));
        assert_eq!(marker, "m");

        // Already drained.
        assert!(frame.take_outcome().is_none());
    }

    #[test]
    fn test_outcome_none_without_marker() {
        let frame: Frame<&str> = Frame::new(None);
        frame.add_tables(&TableSet::single("employee"));
        frame.on_commit();
        assert!(frame.take_outcome().is_none());
    }

    #[test]
    fn test_begin_resets_commit_flag() {
        let frame: Frame<&str> = Frame::new(None);
        frame.add_tables(&TableSet::single("employee"));
        frame.set_marker("m");
        frame.on_commit();
        frame.on_begin();
        assert!(frame.take_outcome().is_none());
        frame.on_rollback();
        assert!(frame.take_outcome().is_none());
    }
}
