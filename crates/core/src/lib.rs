//! Brook Core - Core types shared by the Brook reactive query layer.
//!
//! This crate provides the foundational types used by every other Brook crate:
//!
//! - `Value`: Runtime values bound as statement arguments or read from result rows
//! - `Row`: A result row with its column names
//! - `TableSet`: The set of table names a write affects or a query watches
//! - `ContentValues`: Column/value pairs for insert and update
//! - `ConflictAlgorithm`: Conflict resolution for insert and update
//! - `Error`: Error types for every Brook operation
//!
//! # Example
//!
//! ```rust
//! use brook_core::{Row, TableSet, Value};
//!
//! let watched = TableSet::of(["employee", "manager"]);
//! let changed = TableSet::single("manager");
//! assert!(watched.intersects(&changed));
//!
//! let row = Row::new(
//!     vec!["username".to_string(), "name".to_string()],
//!     vec![Value::from("alice"), Value::from("Alice Allison")],
//! );
//! assert_eq!(row.get_str(0).unwrap(), "alice");
//! assert_eq!(row.get_by_name("name"), Some(&Value::from("Alice Allison")));
//! ```

mod content;
mod error;
mod marker;
mod row;
mod table_set;
mod types;
mod value;

pub use content::{ConflictAlgorithm, ContentValues};
pub use error::{BoxError, Error, Result};
pub use marker::Marker;
pub use row::{Row, NO_ROW_ID};
pub use table_set::TableSet;
pub use types::DataType;
pub use value::Value;
