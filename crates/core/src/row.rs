//! Row structure for Brook.
//!
//! This module defines the `Row` struct which represents a single row of a query result.

use crate::error::{Error, Result};
use crate::types::DataType;
use crate::value::Value;
use std::sync::Arc;

/// Row id returned by an insert that did not insert a row.
pub const NO_ROW_ID: i64 = -1;

/// A row of a query result.
///
/// Column names are shared between every row of the same result set.
#[derive(Clone, Debug)]
pub struct Row {
    /// Column names, indexed by column position.
    columns: Arc<[String]>,
    /// Values stored in this row, indexed by column position.
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row with the given column names and values.
    pub fn new(columns: impl Into<Arc<[String]>>, values: Vec<Value>) -> Self {
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Returns the column names.
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns a shared handle to the column names.
    pub fn shared_columns(&self) -> Arc<[String]> {
        self.columns.clone()
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row and returns its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns the position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Gets a value at the given column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Gets a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.column_index(name).and_then(|i| self.values.get(i))
    }

    /// Returns true if the value at the given column index is Null.
    pub fn is_null(&self, index: usize) -> Result<bool> {
        Ok(self.value(index)?.is_null())
    }

    /// Reads a string column.
    pub fn get_str(&self, index: usize) -> Result<&str> {
        let value = self.value(index)?;
        value
            .as_str()
            .ok_or_else(|| Error::type_mismatch(DataType::String, value.data_type()))
    }

    /// Reads an integer column.
    pub fn get_i64(&self, index: usize) -> Result<i64> {
        let value = self.value(index)?;
        value
            .as_i64()
            .ok_or_else(|| Error::type_mismatch(DataType::Int64, value.data_type()))
    }

    /// Reads a floating point column.
    pub fn get_f64(&self, index: usize) -> Result<f64> {
        let value = self.value(index)?;
        value
            .as_f64()
            .ok_or_else(|| Error::type_mismatch(DataType::Float64, value.data_type()))
    }

    /// Reads a boolean column.
    pub fn get_bool(&self, index: usize) -> Result<bool> {
        let value = self.value(index)?;
        value
            .as_bool()
            .ok_or_else(|| Error::type_mismatch(DataType::Boolean, value.data_type()))
    }

    /// Reads a binary column.
    pub fn get_bytes(&self, index: usize) -> Result<&[u8]> {
        let value = self.value(index)?;
        value
            .as_bytes()
            .ok_or_else(|| Error::type_mismatch(DataType::Bytes, value.data_type()))
    }

    /// Reads a string column by name.
    pub fn get_str_by_name(&self, name: &str) -> Result<&str> {
        let index = self.column_index(name).ok_or_else(|| Error::column_not_found(name))?;
        self.get_str(index)
    }

    /// Reads an integer column by name.
    pub fn get_i64_by_name(&self, name: &str) -> Result<i64> {
        let index = self.column_index(name).ok_or_else(|| Error::column_not_found(name))?;
        self.get_i64(index)
    }

    /// Returns the number of values in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn value(&self, index: usize) -> Result<&Value> {
        self.values.get(index).ok_or_else(|| {
            let column = self
                .columns
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("#{}", index));
            Error::column_not_found(column)
        })
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee(username: &str, name: &str) -> Row {
        Row::new(
            vec!["username".to_string(), "name".to_string()],
            vec![Value::from(username), Value::from(name)],
        )
    }

    #[test]
    fn test_row_new() {
        let row = employee("alice", "Alice Allison");
        assert_eq!(row.len(), 2);
        assert_eq!(row.columns(), &["username".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_row_get_value() {
        let row = employee("alice", "Alice Allison");
        assert_eq!(row.get(0), Some(&Value::from("alice")));
        assert_eq!(row.get(2), None);
        assert_eq!(row.get_by_name("name"), Some(&Value::from("Alice Allison")));
        assert_eq!(row.get_by_name("missing"), None);
    }

    #[test]
    fn test_row_typed_accessors() {
        let row = Row::new(
            vec!["id".to_string(), "score".to_string(), "active".to_string(), "blob".to_string()],
            vec![Value::Int64(7), Value::Float64(1.5), Value::Int64(1), Value::Bytes(vec![9])],
        );
        assert_eq!(row.get_i64(0).unwrap(), 7);
        assert_eq!(row.get_f64(1).unwrap(), 1.5);
        assert!(row.get_bool(2).unwrap());
        assert_eq!(row.get_bytes(3).unwrap(), &[9]);
        assert_eq!(row.get_i64_by_name("id").unwrap(), 7);
    }

    #[test]
    fn test_row_type_mismatch() {
        let row = employee("alice", "Alice Allison");
        match row.get_i64(0) {
            Err(Error::TypeMismatch { expected, got }) => {
                assert_eq!(expected, DataType::Int64);
                assert_eq!(got, Some(DataType::String));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_row_column_not_found() {
        let row = employee("alice", "Alice Allison");
        assert!(matches!(row.get_str(5), Err(Error::ColumnNotFound { .. })));
        assert!(matches!(
            row.get_str_by_name("salary"),
            Err(Error::ColumnNotFound { column }) if column == "salary"
        ));
    }

    #[test]
    fn test_row_null() {
        let row = Row::new(vec!["manager".to_string()], vec![Value::Null]);
        assert!(row.is_null(0).unwrap());
        assert!(row.get_str(0).is_err());
    }

    #[test]
    fn test_row_equality() {
        assert_eq!(employee("alice", "Alice"), employee("alice", "Alice"));
        assert_ne!(employee("alice", "Alice"), employee("bob", "Bob"));
    }
}
