//! Trigger events.

use brook_core::TableSet;

/// Announcement that a committed write changed `tables`.
///
/// `marker` is the value the writer supplied and is echoed unchanged to every query
/// re-issued because of this trigger.
#[derive(Clone, Debug, PartialEq)]
pub struct Trigger<M> {
    /// Tables the write affected.
    pub tables: TableSet,
    /// Provenance supplied by the writer.
    pub marker: M,
}

impl<M> Trigger<M> {
    /// Creates a trigger.
    pub fn new(tables: impl Into<TableSet>, marker: M) -> Self {
        Self {
            tables: tables.into(),
            marker,
        }
    }

    /// Returns true if the trigger concerns any of the watched tables.
    #[inline]
    pub fn matches(&self, watched: &TableSet) -> bool {
        self.tables.intersects(watched)
    }
}
