//! Brook Database - Live queries over a transactional row store.
//!
//! This crate ties storage, the trigger bus and the mapping operators together. Every
//! write names the tables it touched and carries a caller-chosen marker; live queries
//! watching those tables are re-run and tagged with the marker.
//!
//! # Core Components
//!
//! - `Brook`: Configures logging and the query transformer, then wraps storage handles
//! - `Database`: Writes, direct reads, live queries and transactions
//! - `Transaction`: Nested, thread-bound transactions that defer notifications to commit
//! - `QueryObservable` / `MarkedQuery`: Live query stream and its lazy items
//! - `Logger`: Sink for engine log lines (`TracingLogger` by default)
//!
//! # Example
//!
//! ```rust
//! use brook_core::{ConflictAlgorithm, ContentValues, Row};
//! use brook_database::Brook;
//! use brook_reactive::{ImmediateScheduler, ObservableExt, QueryMappingExt};
//! use brook_storage::{SqliteStorage, StorageHandle};
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//!
//! let storage = SqliteStorage::open_in_memory().unwrap();
//! storage
//!     .execute("CREATE TABLE employee (name TEXT NOT NULL)", &[])
//!     .unwrap();
//! let db = Brook::<u32>::default().wrap_storage(storage, ImmediateScheduler);
//!
//! let counts = Arc::new(Mutex::new(Vec::new()));
//! let sink = counts.clone();
//! let _subscription = db
//!     .create_query_for("employee", "SELECT COUNT(*) FROM employee", vec![])
//!     .unwrap()
//!     .map_to_one(|row: &Row| Ok(Some(row.get_i64(0)?)))
//!     .subscribe_next(move |count| sink.lock().push(count))
//!     .unwrap();
//!
//! {
//!     let mut txn = db.new_transaction().unwrap();
//!     for name in ["alice", "bob"] {
//!         let values = ContentValues::new().with("name", name);
//!         txn.insert("employee", 1, ConflictAlgorithm::None, &values).unwrap();
//!     }
//!     txn.mark_successful(1).unwrap();
//!     txn.end().unwrap();
//! }
//!
//! // One notification for the whole transaction.
//! assert_eq!(*counts.lock(), vec![0, 2]);
//! ```

pub mod brook;
pub mod database;
pub mod logger;
pub mod query;
pub mod transaction;

pub use brook::{Brook, BrookBuilder};
pub use database::Database;
pub use logger::{Logger, TracingLogger};
pub use query::{MarkedQuery, QueryObservable, QueryTransformer, Statement};
pub use transaction::Transaction;

// Re-export commonly used types from dependencies
pub use brook_core::{ConflictAlgorithm, ContentValues, Error, Marker, Result, Row, TableSet, Value};
pub use brook_reactive::{ImmediateScheduler, Scheduler, WorkerScheduler};
pub use brook_storage::StorageHandle;
