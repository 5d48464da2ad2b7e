//! Table sets.
//!
//! A `TableSet` names the tables a write affects or a query watches. Two sets match
//! when they share at least one table name.

use core::fmt;
use hashbrown::HashSet;
use std::sync::Arc;

/// An unordered, deduplicated set of table names.
///
/// Names are stored as shared `Arc<str>` so cloning a set (once per trigger and once
/// per re-issued query) never copies the strings themselves.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TableSet {
    tables: HashSet<Arc<str>>,
}

impl TableSet {
    /// Creates an empty table set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding a single table.
    pub fn single(table: impl Into<Arc<str>>) -> Self {
        let mut set = Self::new();
        set.insert(table);
        set
    }

    /// Creates a set from any collection of table names.
    pub fn of<I, T>(tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Arc<str>>,
    {
        tables.into_iter().collect()
    }

    /// Adds a table. Returns true if it was not present.
    pub fn insert(&mut self, table: impl Into<Arc<str>>) -> bool {
        self.tables.insert(table.into())
    }

    /// Adds every table of another set.
    pub fn extend_from(&mut self, other: &TableSet) {
        for table in &other.tables {
            self.tables.insert(table.clone());
        }
    }

    /// Returns true if the table is in the set.
    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    /// Returns true if both sets share at least one table.
    pub fn intersects(&self, other: &TableSet) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.tables.iter().any(|t| large.tables.contains(t))
    }

    /// Returns the number of tables.
    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterates the table names in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.as_ref())
    }

    /// Returns the table names in sorted order.
    pub fn sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.iter().collect();
        names.sort_unstable();
        names
    }

    /// Removes every table, returning the previous contents.
    pub fn take(&mut self) -> TableSet {
        core::mem::take(self)
    }
}

impl<T: Into<Arc<str>>> FromIterator<T> for TableSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<T: Into<Arc<str>>> Extend<T> for TableSet {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.tables.extend(iter.into_iter().map(Into::into));
    }
}

impl From<&str> for TableSet {
    fn from(table: &str) -> Self {
        TableSet::single(table)
    }
}

impl From<String> for TableSet {
    fn from(table: String) -> Self {
        TableSet::single(table)
    }
}

impl<const N: usize> From<[&str; N]> for TableSet {
    fn from(tables: [&str; N]) -> Self {
        TableSet::of(tables)
    }
}

impl From<&[&str]> for TableSet {
    fn from(tables: &[&str]) -> Self {
        TableSet::of(tables.iter().copied())
    }
}

impl From<Vec<String>> for TableSet {
    fn from(tables: Vec<String>) -> Self {
        TableSet::of(tables)
    }
}

impl fmt::Display for TableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.sorted().join(", "))
    }
}

impl fmt::Debug for TableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.sorted()).finish()
    }
}
