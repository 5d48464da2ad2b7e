//! Brook Storage - Storage handle abstraction for the Brook reactive query layer.
//!
//! This crate defines what Brook needs from a transactional row store:
//!
//! - `StorageHandle`: Reads, writes and nestable transactions on one writable connection
//! - `RowCursor`: Forward-only cursor over a query result
//! - `TransactionListener`: Begin/commit/rollback callbacks for one transaction level
//! - `SqliteStorage`: A `StorageHandle` over SQLite (feature `sqlite`, on by default), read
//!   through the windowed `SqliteCursor`
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "sqlite")]
//! # fn main() -> brook_core::Result<()> {
//! use brook_core::{ConflictAlgorithm, ContentValues};
//! use brook_storage::{SqliteStorage, StorageHandle};
//!
//! let storage = SqliteStorage::open_in_memory()?;
//! storage.execute("CREATE TABLE item (id INTEGER PRIMARY KEY, title TEXT)", &[])?;
//!
//! let values = ContentValues::new().with("title", "milk");
//! let id = storage.insert("item", ConflictAlgorithm::None, &values)?;
//! assert_eq!(id, 1);
//!
//! let mut cursor = storage.query("SELECT title FROM item", &[])?.expect("result set");
//! assert!(cursor.move_to_next()?);
//! assert_eq!(cursor.current().unwrap().get_str(0)?, "milk");
//! cursor.close();
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "sqlite"))]
//! # fn main() {}
//! ```

pub mod cursor;
pub mod handle;
pub mod lock;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod transaction;

pub use cursor::{CursorStats, RowCursor, VecCursor};
pub use handle::StorageHandle;
pub use lock::WriteOwner;
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteCursor, SqliteStorage};
pub use transaction::{EndedLevel, TransactionListener, TransactionMode, TransactionStack};
