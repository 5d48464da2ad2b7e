//! Error types for Brook.

use crate::types::DataType;
use thiserror::Error;

/// Boxed error produced by a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for Brook operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for Brook operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation is invalid in the current transaction or subscription state.
    #[error("{message}")]
    State { message: String },

    /// A single-row mapping saw more than one row.
    #[error("{message}")]
    Cardinality { message: String },

    /// A row mapper that must produce a value returned none.
    #[error("{message}")]
    Mapping { message: String },

    /// Invalid construction argument.
    #[error("{message}")]
    Configuration { message: String },

    /// Column not found in a result row.
    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    /// Column value has a different type than requested.
    #[error("Type mismatch: expected {expected:?}, got {got:?}")]
    TypeMismatch {
        expected: DataType,
        got: Option<DataType>,
    },

    /// Error raised by the storage engine, passed through unchanged.
    #[error(transparent)]
    Storage(BoxError),
}

impl Error {
    /// Creates a state error.
    pub fn state(message: impl Into<String>) -> Self {
        Error::State {
            message: message.into(),
        }
    }

    /// Creates a cardinality error.
    pub fn cardinality(message: impl Into<String>) -> Self {
        Error::Cardinality {
            message: message.into(),
        }
    }

    /// Creates a mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Error::Mapping {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            column: column.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: DataType, got: Option<DataType>) -> Self {
        Error::TypeMismatch { expected, got }
    }

    /// Wraps a storage engine error.
    pub fn storage<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Storage(Box::new(error))
    }

    /// Returns true for errors raised because of transaction or subscription state.
    pub fn is_state(&self) -> bool {
        matches!(self, Error::State { .. })
    }

    /// Returns true for errors raised by the storage engine.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}
