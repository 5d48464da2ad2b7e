//! Reactive database over a storage handle.
//!
//! `Database` routes writes to storage and turns qualifying outcomes into triggers.
//! Outside a transaction a trigger is published at once. Inside one it is added to the
//! calling thread's innermost transaction frame and published when that frame ends
//! committed.

use crate::logger::{display_args, indent_sql, Logger};
use crate::query::{QueryObservable, QueryPipeline, QueryTransformer, Statement};
use crate::transaction::{Frame, Transaction};
use brook_core::{
    ConflictAlgorithm, ContentValues, Error, Marker, Result, TableSet, Value, NO_ROW_ID,
};
use brook_reactive::{BoxObservable, Scheduler, TriggerBus, TriggerStream};
use brook_storage::{RowCursor, StorageHandle, TransactionListener, TransactionMode};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// State shared by a database, its transactions and its live queries.
pub(crate) struct Shared<M: Marker> {
    pub(crate) storage: Arc<dyn StorageHandle>,
    pub(crate) bus: Arc<TriggerBus<M>>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    logger: Arc<dyn Logger>,
    logging: AtomicBool,
    transformer: QueryTransformer<M>,
    /// Open transaction frames per thread, innermost last.
    frames: Mutex<HashMap<ThreadId, Vec<Arc<Frame<M>>>>>,
}

impl<M: Marker> Shared<M> {
    pub(crate) fn log(&self, message: impl FnOnce() -> String) {
        if self.logging.load(Ordering::Relaxed) {
            self.logger.log(&message());
        }
    }

    pub(crate) fn current_frame(&self) -> Option<Arc<Frame<M>>> {
        self.frames
            .lock()
            .get(&thread::current().id())
            .and_then(|stack| stack.last().cloned())
    }

    pub(crate) fn in_transaction(&self) -> bool {
        self.frames.lock().contains_key(&thread::current().id())
    }

    pub(crate) fn begin(&self, mode: TransactionMode) -> Result<Arc<Frame<M>>> {
        let parent = self.current_frame();
        let frame = Arc::new(Frame::new(parent.as_deref()));
        let listener: Arc<dyn TransactionListener> = frame.clone();
        self.storage.begin_transaction_with_mode(mode, listener)?;
        self.frames
            .lock()
            .entry(thread::current().id())
            .or_default()
            .push(Arc::clone(&frame));
        self.log(|| format!("TXN BEGIN {}", frame));
        Ok(frame)
    }

    /// Removes `frame` from the calling thread's stack. It must be the innermost one.
    pub(crate) fn pop_frame(&self, frame: &Arc<Frame<M>>) -> Result<()> {
        let id = thread::current().id();
        let mut frames = self.frames.lock();
        let stack = frames
            .get_mut(&id)
            .ok_or_else(|| Error::state("Not in transaction."))?;
        match stack.last() {
            Some(top) if Arc::ptr_eq(top, frame) => {
                stack.pop();
            }
            _ => {
                return Err(Error::state(
                    "Transactions must be ended in the reverse order they were started.",
                ))
            }
        }
        if stack.is_empty() {
            frames.remove(&id);
        }
        Ok(())
    }

    /// Publishes a trigger, or adds its tables to the calling thread's innermost frame.
    pub(crate) fn send_table_trigger(&self, tables: TableSet, marker: M) {
        match self.current_frame() {
            Some(frame) => frame.add_tables(&tables),
            None => {
                self.log(|| format!("TRIGGER {}", tables));
                self.bus.publish(tables, marker);
            }
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.current_frame() {
            Some(frame) if frame.is_marked() => Err(Error::state(
                "Cannot write in a transaction that was already marked successful.",
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn query(&self, sql: &str, args: &[Value]) -> Result<Option<Box<dyn RowCursor>>> {
        self.log(|| {
            format!(
                "QUERY\n  sql: {}\n  args: {}",
                indent_sql(sql),
                display_args(args)
            )
        });
        self.storage.query(sql, args)
    }

    pub(crate) fn insert(
        &self,
        table: &str,
        marker: M,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
    ) -> Result<i64> {
        self.ensure_writable()?;
        self.log(|| {
            format!(
                "INSERT\n  table: {}\n  marker: {:?}\n  values: {}\n  conflictAlgorithm: {}",
                table, marker, values, conflict
            )
        });
        let row_id = self.storage.insert(table, conflict, values)?;
        self.log(|| format!("INSERT id: {}", row_id));

        if row_id != NO_ROW_ID {
            self.send_table_trigger(TableSet::single(table), marker);
        }
        Ok(row_id)
    }

    pub(crate) fn update(
        &self,
        table: &str,
        marker: M,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize> {
        self.ensure_writable()?;
        self.log(|| {
            format!(
                "UPDATE\n  table: {}\n  marker: {:?}\n  values: {}\n  whereClause: {}\n  whereArgs: {}\n  conflictAlgorithm: {}",
                table,
                marker,
                values,
                where_clause.unwrap_or(""),
                display_args(where_args),
                conflict
            )
        });
        let rows = self
            .storage
            .update(table, conflict, values, where_clause, where_args)?;
        self.log(|| format!("UPDATE affected {} {}", rows, plural(rows)));

        if rows > 0 {
            self.send_table_trigger(TableSet::single(table), marker);
        }
        Ok(rows)
    }

    pub(crate) fn delete(
        &self,
        table: &str,
        marker: M,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize> {
        self.ensure_writable()?;
        self.log(|| {
            format!(
                "DELETE\n  table: {}\n  marker: {:?}\n  whereClause: {}\n  whereArgs: {}",
                table,
                marker,
                where_clause.unwrap_or(""),
                display_args(where_args)
            )
        });
        let rows = self.storage.delete(table, where_clause, where_args)?;
        self.log(|| format!("DELETE affected {} {}", rows, plural(rows)));

        if rows > 0 {
            self.send_table_trigger(TableSet::single(table), marker);
        }
        Ok(rows)
    }

    pub(crate) fn execute(&self, sql: &str, args: &[Value]) -> Result<()> {
        self.ensure_writable()?;
        self.log(|| {
            format!(
                "EXECUTE\n  sql: {}\n  args: {}",
                indent_sql(sql),
                display_args(args)
            )
        });
        self.storage.execute(sql, args)
    }

    pub(crate) fn execute_and_trigger(
        &self,
        tables: TableSet,
        marker: M,
        sql: &str,
        args: &[Value],
    ) -> Result<()> {
        self.execute(sql, args)?;
        self.send_table_trigger(tables, marker);
        Ok(())
    }

    pub(crate) fn execute_update_delete(
        &self,
        tables: TableSet,
        marker: M,
        sql: &str,
        args: &[Value],
    ) -> Result<usize> {
        self.ensure_writable()?;
        self.log(|| {
            format!(
                "EXECUTE\n  sql: {}\n  args: {}",
                indent_sql(sql),
                display_args(args)
            )
        });
        let rows = self.storage.execute_update_delete(sql, args)?;
        self.log(|| format!("EXECUTE affected {} {}", rows, plural(rows)));

        if rows > 0 {
            self.send_table_trigger(tables, marker);
        }
        Ok(rows)
    }

    pub(crate) fn execute_insert(
        &self,
        tables: TableSet,
        marker: M,
        sql: &str,
        args: &[Value],
    ) -> Result<i64> {
        self.ensure_writable()?;
        self.log(|| {
            format!(
                "EXECUTE\n  sql: {}\n  args: {}",
                indent_sql(sql),
                display_args(args)
            )
        });
        let row_id = self.storage.execute_insert(sql, args)?;
        self.log(|| format!("EXECUTE id: {}", row_id));

        if row_id != NO_ROW_ID {
            self.send_table_trigger(tables, marker);
        }
        Ok(row_id)
    }
}

fn plural(rows: usize) -> &'static str {
    if rows == 1 {
        "row"
    } else {
        "rows"
    }
}

/// A reactive wrapper around a storage handle.
///
/// Cloning is cheap; clones share storage, trigger bus and transaction state.
///
/// # Example
///
/// ```rust
/// use brook_core::{ConflictAlgorithm, ContentValues, Row};
/// use brook_database::Brook;
/// use brook_reactive::{ImmediateScheduler, Notification, ObservableExt, QueryMappingExt};
/// use brook_storage::{SqliteStorage, StorageHandle};
///
/// let storage = SqliteStorage::open_in_memory().unwrap();
/// storage
///     .execute("CREATE TABLE item (id INTEGER PRIMARY KEY, title TEXT NOT NULL)", &[])
///     .unwrap();
/// let db = Brook::<&'static str>::builder()
///     .build()
///     .wrap_storage(storage, ImmediateScheduler);
///
/// let titles = db
///     .create_query_for("item", "SELECT title FROM item ORDER BY id", vec![])
///     .unwrap()
///     .map_to_list(|row: &Row| Ok(Some(row.get_str(0)?.to_string())))
///     .subscribe_channel()
///     .unwrap();
///
/// db.insert("item", "user", ConflictAlgorithm::None, &ContentValues::new().with("title", "milk"))
///     .unwrap();
///
/// let lists: Vec<Vec<String>> = titles
///     .drain()
///     .into_iter()
///     .filter_map(Notification::into_next)
///     .collect();
/// assert_eq!(lists, vec![vec![], vec!["milk".to_string()]]);
/// ```
pub struct Database<M: Marker> {
    shared: Arc<Shared<M>>,
}

impl<M: Marker> Clone for Database<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: Marker> Database<M> {
    pub(crate) fn new(
        storage: Arc<dyn StorageHandle>,
        scheduler: Arc<dyn Scheduler>,
        logger: Arc<dyn Logger>,
        transformer: QueryTransformer<M>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                storage,
                bus: Arc::new(TriggerBus::new()),
                scheduler,
                logger,
                logging: AtomicBool::new(false),
                transformer,
                frames: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Turns engine logging on or off.
    pub fn set_logging_enabled(&self, enabled: bool) {
        self.shared.logging.store(enabled, Ordering::Relaxed);
    }

    /// Returns true if engine logging is on.
    pub fn is_logging_enabled(&self) -> bool {
        self.shared.logging.load(Ordering::Relaxed)
    }

    /// The wrapped storage handle.
    pub fn storage(&self) -> &Arc<dyn StorageHandle> {
        &self.shared.storage
    }

    /// Returns true if the calling thread has a transaction open.
    pub fn in_transaction(&self) -> bool {
        self.shared.in_transaction()
    }

    /// Begins an exclusive transaction on the calling thread.
    ///
    /// The returned handle must be marked successful for its writes to commit and
    /// notify. Dropping it without calling `end` ends it.
    ///
    /// Fails with a state error if the thread already has a transaction open. Nested
    /// transactions are begun from the open [`Transaction`] instead.
    pub fn new_transaction(&self) -> Result<Transaction<'_, M>> {
        self.begin_outermost(TransactionMode::Exclusive)
    }

    /// Begins a transaction that lets other connections keep reading.
    ///
    /// Same restriction as [`new_transaction`](Database::new_transaction).
    pub fn new_non_exclusive_transaction(&self) -> Result<Transaction<'_, M>> {
        self.begin_outermost(TransactionMode::Immediate)
    }

    fn begin_outermost(&self, mode: TransactionMode) -> Result<Transaction<'_, M>> {
        if self.shared.in_transaction() {
            return Err(Error::state(
                "A transaction is already open on this thread. Begin nested transactions from it.",
            ));
        }
        Transaction::begin(&self.shared, mode)
    }

    /// Creates a live query over `sql`, re-run whenever any of `tables` changes.
    ///
    /// The first item of every subscription is an unmarked query delivered at once;
    /// each later item carries the marker of the write that caused it.
    pub fn create_query(
        &self,
        tables: impl Into<TableSet>,
        sql: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<QueryObservable<M>> {
        if self.shared.in_transaction() {
            return Err(Error::state(
                "Cannot create observable query in transaction. Use query() for a query inside a transaction.",
            ));
        }
        let pipeline = QueryPipeline::new(
            Arc::clone(&self.shared),
            tables.into(),
            Statement::new(sql, args),
        );
        let observable: BoxObservable<_> = Arc::new(pipeline);
        Ok(QueryObservable::new((self.shared.transformer)(observable)))
    }

    /// Creates a live query watching a single table.
    pub fn create_query_for(
        &self,
        table: &str,
        sql: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<QueryObservable<M>> {
        self.create_query(TableSet::single(table), sql, args)
    }

    /// Runs a read directly. Usable inside transactions.
    pub fn query(&self, sql: &str, args: &[Value]) -> Result<Option<Box<dyn RowCursor>>> {
        self.shared.query(sql, args)
    }

    /// Returns the raw triggers touching any of `tables`.
    pub fn subscribe_triggers(&self, tables: impl Into<TableSet>) -> TriggerStream<M> {
        self.shared.bus.subscribe_filtered(tables)
    }

    /// Number of live subscriptions on the trigger bus.
    pub fn trigger_subscriber_count(&self) -> usize {
        self.shared.bus.subscriber_count()
    }

    /// Inserts a row. Notifies `table` unless nothing was inserted.
    pub fn insert(
        &self,
        table: &str,
        marker: M,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
    ) -> Result<i64> {
        self.shared.insert(table, marker, conflict, values)
    }

    /// Updates rows. Notifies `table` if any row changed.
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

    /// Deletes rows. Notifies `table` if any row was deleted.
    pub fn delete(
        &self,
        table: &str,
        marker: M,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize> {
        self.shared.delete(table, marker, where_clause, where_args)
    }

    /// Runs a statement without notifying anyone.
    pub fn execute(&self, sql: &str, args: &[Value]) -> Result<()> {
        self.shared.execute(sql, args)
    }

    /// Runs a statement, then notifies `tables`.
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

    /// Runs an `UPDATE` or `DELETE`. Notifies `tables` if any row changed.
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

    /// Runs an `INSERT`. Notifies `tables` unless nothing was inserted.
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
