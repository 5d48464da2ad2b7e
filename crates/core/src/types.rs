//! Data type definitions for Brook.
//!
//! This module defines the column types a storage backend can hand back in a result row.

/// Column data types understood by Brook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string
    String,
    /// Binary data
    Bytes,
}
