//! Column/value pairs and conflict resolution for writes.

use crate::value::Value;
use core::fmt;

/// Conflict resolution applied by insert and update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConflictAlgorithm {
    /// Roll back the whole transaction on conflict.
    Rollback,
    /// Abort the current statement, keeping earlier changes of the transaction.
    Abort,
    /// Fail the current statement, keeping changes it already made.
    Fail,
    /// Skip the conflicting row.
    Ignore,
    /// Replace the conflicting row.
    Replace,
    /// No conflict clause; the engine default applies.
    #[default]
    None,
}

impl ConflictAlgorithm {
    /// Returns the `OR ...` clause inserted after `INSERT`/`UPDATE`.
    pub fn sql_clause(&self) -> &'static str {
        match self {
            ConflictAlgorithm::Rollback => " OR ROLLBACK",
            ConflictAlgorithm::Abort => " OR ABORT",
            ConflictAlgorithm::Fail => " OR FAIL",
            ConflictAlgorithm::Ignore => " OR IGNORE",
            ConflictAlgorithm::Replace => " OR REPLACE",
            ConflictAlgorithm::None => "",
        }
    }
}

impl fmt::Display for ConflictAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictAlgorithm::Rollback => "rollback",
            ConflictAlgorithm::Abort => "abort",
            ConflictAlgorithm::Fail => "fail",
            ConflictAlgorithm::Ignore => "ignore",
            ConflictAlgorithm::Replace => "replace",
            ConflictAlgorithm::None => "none",
        };
        f.write_str(name)
    }
}

/// Ordered column/value pairs for insert and update.
///
/// Putting a column twice replaces the earlier value but keeps its position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentValues {
    entries: Vec<(String, Value)>,
}

impl ContentValues {
    /// Creates an empty set of values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column value.
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Builder-style `put`.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(column, value);
        self
    }

    /// Gets a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Returns the column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    /// Returns the values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no column is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ContentValues
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = ContentValues::new();
        for (column, value) in iter {
            values.put(column, value);
        }
        values
    }
}

impl fmt::Display for ContentValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (column, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", column, value)?;
        }
        Ok(())
    }
}
