//! Row cursors.
//!
//! A `RowCursor` walks a result set forward one row at a time and must be closed exactly
//! once by whoever consumes it.

use brook_core::{Error, Result, Row};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Forward-only cursor over a query result.
pub trait RowCursor: Send {
    /// Number of rows in the result, if the backend knows it up front.
    fn count_hint(&self) -> Option<usize> {
        None
    }

    /// Advances to the next row. Returns false once the result is exhausted.
    fn move_to_next(&mut self) -> Result<bool>;

    /// Returns the row the cursor is positioned on.
    fn current(&self) -> Option<&Row>;

    /// Releases the cursor. Calling it again has no effect.
    fn close(&mut self);

    /// Returns true once `close` has been called.
    fn is_closed(&self) -> bool;
}

/// Counters shared with the cursors that record into them.
#[derive(Clone, Debug, Default)]
pub struct CursorStats {
    inner: Arc<StatCounts>,
}

#[derive(Debug, Default)]
struct StatCounts {
    rows: AtomicUsize,
    closed: AtomicUsize,
}

impl CursorStats {
    /// Creates counters starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows pulled out of the result.
    pub fn rows_read(&self) -> usize {
        self.inner.rows.load(Ordering::SeqCst)
    }

    /// Number of times a cursor was closed.
    pub fn close_count(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn record_rows(&self, n: usize) {
        self.inner.rows.fetch_add(n, Ordering::SeqCst);
    }

    pub(crate) fn record_close(&self) {
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Cursor over rows already materialized in memory.
#[derive(Debug)]
pub struct VecCursor {
    rows: Vec<Row>,
    /// Position of the current row plus one; zero before the first `move_to_next`.
    next: usize,
    closed: bool,
    stats: Option<CursorStats>,
}

impl VecCursor {
    /// Creates a cursor over the given rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            next: 0,
            closed: false,
            stats: None,
        }
    }

    /// Attaches counters that record reads and closes.
    pub fn with_stats(mut self, stats: CursorStats) -> Self {
        self.stats = Some(stats);
        self
    }
}

impl RowCursor for VecCursor {
    fn count_hint(&self) -> Option<usize> {
        Some(self.rows.len())
    }

    fn move_to_next(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::state("Cursor is closed"));
        }
        if self.next >= self.rows.len() {
            self.next = self.rows.len() + 1;
            return Ok(false);
        }
        self.next += 1;
        if let Some(stats) = &self.stats {
            stats.record_rows(1);
        }
        Ok(true)
    }

    fn current(&self) -> Option<&Row> {
        if self.closed || self.next == 0 {
            return None;
        }
        self.rows.get(self.next - 1)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rows.clear();
        if let Some(stats) = &self.stats {
            stats.record_close();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
