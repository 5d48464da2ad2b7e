//! SQLite storage backend.
//!
//! Wraps one `rusqlite::Connection`. Query results are read through a `SqliteCursor`,
//! which fills a window of rows at a time and holds the session lock only while a
//! window is being filled. No statement outlives the call that filled its window.

use crate::cursor::{CursorStats, RowCursor};
use crate::handle::StorageHandle;
use crate::lock::WriteOwner;
use crate::transaction::{EndedLevel, TransactionListener, TransactionMode, TransactionStack};
use brook_core::{ConflictAlgorithm, ContentValues, Error, Result, Row, Value, NO_ROW_ID};
use parking_lot::{Condvar, Mutex, MutexGuard};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Session {
    conn: Connection,
    owner: WriteOwner,
    stack: TransactionStack,
}

struct Shared {
    session: Mutex<Session>,
    released: Condvar,
}

impl Shared {
    /// Locks the session once no other thread holds an open transaction.
    fn enter(&self) -> MutexGuard<'_, Session> {
        let mut session = self.session.lock();
        while !session.owner.can_enter_current() {
            session.owner.start_waiting();
            self.released.wait(&mut session);
            session.owner.stop_waiting();
        }
        session
    }
}

/// A `StorageHandle` backed by a single SQLite connection.
pub struct SqliteStorage {
    shared: Arc<Shared>,
    stats: CursorStats,
}

impl SqliteStorage {
    /// Wraps an open connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(Session {
                    conn,
                    owner: WriteOwner::new(),
                    stack: TransactionStack::new(),
                }),
                released: Condvar::new(),
            }),
            stats: CursorStats::new(),
        }
    }

    /// Opens a database file, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(Error::storage)?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::storage)?;
        Ok(Self::from_connection(conn))
    }

    /// Returns true if a thread is blocked waiting for the current transaction to end.
    pub fn is_contended(&self) -> bool {
        self.shared.session.lock().owner.is_contended()
    }

    /// Counters for every cursor this store has handed out.
    pub fn cursor_stats(&self) -> CursorStats {
        self.stats.clone()
    }

    fn enter(&self) -> MutexGuard<'_, Session> {
        self.shared.enter()
    }

    /// Locks the session and checks the calling thread has a transaction open.
    fn enter_transaction(&self) -> Result<MutexGuard<'_, Session>> {
        let session = self.enter();
        if !session.owner.is_held_by_current() {
            return Err(Error::state(
                "Cannot perform this operation because there is no current transaction.",
            ));
        }
        Ok(session)
    }

    /// Finishes the outermost level: runs COMMIT or ROLLBACK and releases the connection.
    fn finish_outermost(&self, session: &mut Session, ended: &mut EndedLevel) -> Result<()> {
        let result = if ended.successful {
            let committed = session.conn.execute_batch("COMMIT;").map_err(Error::storage);
            if committed.is_err() {
                ended.successful = false;
                if !session.conn.is_autocommit() {
                    if let Err(e) = session.conn.execute_batch("ROLLBACK;") {
                        tracing::warn!(target: "brook::storage", error = %e, "rollback after failed commit");
                    }
                }
            }
            committed
        } else {
            session.conn.execute_batch("ROLLBACK;").map_err(Error::storage)
        };
        session.owner.release();
        self.shared.released.notify_all();
        tracing::debug!(
            target: "brook::storage",
            committed = ended.successful,
            "transaction finished"
        );
        result
    }
}

fn to_sql(args: &[Value]) -> Vec<SqlValue> {
    args.iter()
        .map(|value| match value {
            Value::Null => SqlValue::Null,
            Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
            Value::Int64(i) => SqlValue::Integer(*i),
            Value::Float64(f) => SqlValue::Real(*f),
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Bytes(b) => SqlValue::Blob(b.clone()),
        })
        .collect()
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

/// Runs `sql`, skips the first `skip` rows and reads at most `take` more.
fn read_window(
    conn: &Connection,
    sql: &str,
    args: &[SqlValue],
    skip: usize,
    take: usize,
) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Arc<[String]> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    for _ in 0..skip {
        if rows.next()?.is_none() {
            return Ok(Vec::new());
        }
    }
    let mut out = Vec::with_capacity(take);
    while out.len() < take {
        let Some(row) = rows.next()? else {
            break;
        };
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(from_sql(row.get_ref(i)?));
        }
        out.push(Row::new(columns.clone(), values));
    }
    Ok(out)
}

const FIRST_WINDOW: usize = 2;
const MAX_WINDOW: usize = 4096;

/// Cursor over a SQLite result, filled one window of rows at a time.
///
/// Each window re-runs the statement and steps past the rows already read, so the
/// session is free between windows. The first window is filled by
/// [`query`](StorageHandle::query) itself and holds two rows, which is all a
/// single-row read ever needs; later windows double in size up to 4096 rows.
///
/// Rows committed by other writers between two windows can shift the result, as with
/// any cursor that does not pin a snapshot.
pub struct SqliteCursor {
    shared: Arc<Shared>,
    sql: String,
    args: Vec<SqlValue>,
    window: VecDeque<Row>,
    window_size: usize,
    consumed: usize,
    exhausted: bool,
    current: Option<Row>,
    closed: bool,
    stats: CursorStats,
}

impl SqliteCursor {
    fn open(shared: Arc<Shared>, sql: &str, args: &[Value], stats: CursorStats) -> Result<Self> {
        let mut cursor = Self {
            shared,
            sql: sql.to_string(),
            args: to_sql(args),
            window: VecDeque::new(),
            window_size: FIRST_WINDOW,
            consumed: 0,
            exhausted: false,
            current: None,
            closed: false,
            stats,
        };
        cursor.fill()?;
        Ok(cursor)
    }

    fn fill(&mut self) -> Result<()> {
        let rows = {
            let session = self.shared.enter();
            read_window(&session.conn, &self.sql, &self.args, self.consumed, self.window_size)
                .map_err(Error::storage)?
        };
        self.exhausted = rows.len() < self.window_size;
        self.consumed += rows.len();
        self.stats.record_rows(rows.len());
        tracing::trace!(
            target: "brook::storage",
            rows = rows.len(),
            consumed = self.consumed,
            "cursor window filled"
        );
        self.window.extend(rows);
        self.window_size = (self.window_size * 2).min(MAX_WINDOW);
        Ok(())
    }
}

impl RowCursor for SqliteCursor {
    fn count_hint(&self) -> Option<usize> {
        self.exhausted.then_some(self.consumed)
    }

    fn move_to_next(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::state("Cursor is closed"));
        }
        if self.window.is_empty() && !self.exhausted {
            self.fill()?;
        }
        self.current = self.window.pop_front();
        Ok(self.current.is_some())
    }

    fn current(&self) -> Option<&Row> {
        if self.closed {
            return None;
        }
        self.current.as_ref()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current = None;
        self.window.clear();
        self.stats.record_close();
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

fn changes(conn: &Connection, sql: &str, args: Vec<SqlValue>) -> Result<usize> {
    conn.execute(sql, params_from_iter(args))
        .map_err(Error::storage)
}

fn row_id_after(conn: &Connection, changed: usize) -> i64 {
    if changed == 0 {
        NO_ROW_ID
    } else {
        conn.last_insert_rowid()
    }
}

impl StorageHandle for SqliteStorage {
    fn query(&self, sql: &str, args: &[Value]) -> Result<Option<Box<dyn RowCursor>>> {
        let cursor = SqliteCursor::open(Arc::clone(&self.shared), sql, args, self.stats.clone())?;
        Ok(Some(Box::new(cursor)))
    }

    fn execute(&self, sql: &str, args: &[Value]) -> Result<()> {
        let session = self.enter();
        if args.is_empty() {
            session.conn.execute_batch(sql).map_err(Error::storage)
        } else {
            changes(&session.conn, sql, to_sql(args)).map(|_| ())
        }
    }

    fn insert(
        &self,
        table: &str,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
    ) -> Result<i64> {
        let mut sql = format!("INSERT{} INTO {}", conflict.sql_clause(), table);
        if values.is_empty() {
            sql.push_str(" DEFAULT VALUES");
        } else {
            let columns: Vec<&str> = values.columns().collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            sql.push_str(&format!(" ({}) VALUES ({})", columns.join(", "), placeholders));
        }
        let args: Vec<Value> = values.values().cloned().collect();

        let session = self.enter();
        let changed = changes(&session.conn, &sql, to_sql(&args))?;
        Ok(row_id_after(&session.conn, changed))
    }

    fn update(
        &self,
        table: &str,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize> {
        if values.is_empty() {
            return Err(Error::configuration("Empty values"));
        }
        let assignments: Vec<String> = values.columns().map(|c| format!("{} = ?", c)).collect();
        let mut sql = format!(
            "UPDATE{} {} SET {}",
            conflict.sql_clause(),
            table,
            assignments.join(", ")
        );
        if let Some(clause) = where_clause.filter(|c| !c.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        let args: Vec<Value> = values.values().chain(where_args).cloned().collect();

        let session = self.enter();
        changes(&session.conn, &sql, to_sql(&args))
    }

    fn delete(
        &self,
        table: &str,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize> {
        let mut sql = format!("DELETE FROM {}", table);
        if let Some(clause) = where_clause.filter(|c| !c.is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }

        let session = self.enter();
        changes(&session.conn, &sql, to_sql(where_args))
    }

    fn execute_update_delete(&self, sql: &str, args: &[Value]) -> Result<usize> {
        let session = self.enter();
        changes(&session.conn, sql, to_sql(args))
    }

    fn execute_insert(&self, sql: &str, args: &[Value]) -> Result<i64> {
        let session = self.enter();
        let changed = changes(&session.conn, sql, to_sql(args))?;
        Ok(row_id_after(&session.conn, changed))
    }

    fn begin_transaction_with_mode(
        &self,
        mode: TransactionMode,
        listener: Arc<dyn TransactionListener>,
    ) -> Result<()> {
        {
            let mut session = self.enter();
            if session.stack.is_empty() {
                session
                    .conn
                    .execute_batch(mode.begin_sql())
                    .map_err(Error::storage)?;
                session.owner.acquire_current();
            }
            session.stack.push(mode, listener.clone());
            tracing::trace!(target: "brook::storage", depth = session.stack.depth(), "transaction begun");
        }
        listener.on_begin();
        Ok(())
    }

    fn set_transaction_successful(&self) -> Result<()> {
        let mut session = self.enter_transaction()?;
        session.stack.mark_successful()
    }

    fn end_transaction(&self) -> Result<()> {
        let (ended, result) = {
            let mut guard = self.enter_transaction()?;
            let session = &mut *guard;
            let mut ended = session.stack.pop()?;
            let result = if ended.outermost {
                self.finish_outermost(session, &mut ended)
            } else {
                Ok(())
            };
            (ended, result)
        };
        ended.notify();
        result
    }

    fn yield_if_contended_safely(&self, sleep_after_yield: Option<Duration>) -> Result<bool> {
        let (ended, mode, result) = {
            let mut guard = self.enter_transaction()?;
            let session = &mut *guard;
            session.stack.check_yieldable()?;
            if !session.owner.is_contended() {
                return Ok(false);
            }
            let mode = session.stack.outer_mode().unwrap_or_default();
            session.stack.mark_successful()?;
            let mut ended = session.stack.pop()?;
            let result = self.finish_outermost(session, &mut ended);
            (ended, mode, result)
        };
        ended.notify();
        result?;
        tracing::debug!(target: "brook::storage", "transaction yielded to a waiting thread");

        match sleep_after_yield {
            Some(duration) if !duration.is_zero() => thread::sleep(duration),
            _ => thread::yield_now(),
        }
        self.begin_transaction_with_mode(mode, ended.listener)?;
        Ok(true)
    }

    fn in_transaction(&self) -> bool {
        self.shared.session.lock().owner.is_held_by_current()
    }
}
