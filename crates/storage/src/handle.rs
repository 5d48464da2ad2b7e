//! The storage handle consumed by the reactive layer.

use crate::cursor::RowCursor;
use crate::transaction::{TransactionListener, TransactionMode};
use brook_core::{ConflictAlgorithm, ContentValues, Result, Value};
use std::sync::Arc;
use std::time::Duration;

/// A transactional row store with a single writable connection.
///
/// Transactions are owned by the thread that began them: until that thread ends its
/// outermost transaction, every call from another thread blocks.
pub trait StorageHandle: Send + Sync + 'static {
    /// Runs a read. `None` means the backend produced no result set at all.
    fn query(&self, sql: &str, args: &[Value]) -> Result<Option<Box<dyn RowCursor>>>;

    /// Runs a statement that returns no rows.
    fn execute(&self, sql: &str, args: &[Value]) -> Result<()>;

    /// Inserts a row. Returns the new row id, or `NO_ROW_ID` if nothing was inserted.
    fn insert(
        &self,
        table: &str,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
    ) -> Result<i64>;

    /// Updates rows matching `where_clause`. Returns the number of rows changed.
    fn update(
        &self,
        table: &str,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize>;

    /// Deletes rows matching `where_clause`. Returns the number of rows deleted.
    fn delete(&self, table: &str, where_clause: Option<&str>, where_args: &[Value])
        -> Result<usize>;

    /// Runs an `UPDATE` or `DELETE` statement. Returns the number of rows changed.
    fn execute_update_delete(&self, sql: &str, args: &[Value]) -> Result<usize>;

    /// Runs an `INSERT` statement. Returns the new row id, or `NO_ROW_ID`.
    fn execute_insert(&self, sql: &str, args: &[Value]) -> Result<i64>;

    /// Begins a transaction, nested if the calling thread already has one open.
    fn begin_transaction_with_mode(
        &self,
        mode: TransactionMode,
        listener: Arc<dyn TransactionListener>,
    ) -> Result<()>;

    /// Begins an exclusive transaction.
    fn begin_transaction(&self, listener: Arc<dyn TransactionListener>) -> Result<()> {
        self.begin_transaction_with_mode(TransactionMode::Exclusive, listener)
    }

    /// Begins a transaction that lets other connections keep reading.
    fn begin_transaction_non_exclusive(&self, listener: Arc<dyn TransactionListener>) -> Result<()> {
        self.begin_transaction_with_mode(TransactionMode::Immediate, listener)
    }

    /// Marks the innermost transaction of the calling thread successful.
    fn set_transaction_successful(&self) -> Result<()>;

    /// Ends the innermost transaction of the calling thread.
    fn end_transaction(&self) -> Result<()>;

    /// Commits and restarts the calling thread's transaction if another thread is waiting.
    ///
    /// Returns true if the transaction yielded.
    fn yield_if_contended_safely(&self, sleep_after_yield: Option<Duration>) -> Result<bool>;

    /// Returns true if the calling thread has a transaction open.
    fn in_transaction(&self) -> bool;
}
