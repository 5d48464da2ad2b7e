//! Live queries.
//!
//! A `QueryPipeline` emits one `MarkedQuery` when subscribed and one more for every
//! trigger touching its tables. Items are lazy: the statement only runs when a mapping
//! operator (or the subscriber itself) calls [`Query::run`].

use crate::database::Shared;
use crate::logger::{display_args, indent_sql};
use brook_core::{Error, Marker, Result, TableSet, Value};
use brook_reactive::{BoxObservable, Disposable, Observable, Observer, Query, Scheduler, Subscription};
use brook_storage::RowCursor;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Rewrites every live query's stream before it is handed to subscribers.
pub type QueryTransformer<M> =
    Arc<dyn Fn(BoxObservable<MarkedQuery<M>>) -> BoxObservable<MarkedQuery<M>> + Send + Sync>;

/// SQL text with its bound arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    sql: String,
    args: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    #[inline]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[inline]
    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// One emission of a live query.
///
/// `marker` is `None` for the item delivered on subscription and the triggering write's
/// marker for every later item.
pub struct MarkedQuery<M: Marker> {
    marker: Option<M>,
    tables: TableSet,
    statement: Arc<Statement>,
    shared: Arc<Shared<M>>,
}

impl<M: Marker> MarkedQuery<M> {
    /// Marker of the write that caused this item.
    #[inline]
    pub fn marker(&self) -> Option<&M> {
        self.marker.as_ref()
    }

    /// Tables the query watches.
    #[inline]
    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    #[inline]
    pub fn sql(&self) -> &str {
        self.statement.sql()
    }

    #[inline]
    pub fn args(&self) -> &[Value] {
        self.statement.args()
    }
}

impl<M: Marker> Query for MarkedQuery<M> {
    /// Runs the statement. Fails if the calling thread has a transaction open.
    fn run(&self) -> Result<Option<Box<dyn RowCursor>>> {
        if self.shared.in_transaction() {
            return Err(Error::state(
                "Cannot execute observable query in a transaction.",
            ));
        }
        self.shared.log(|| {
            format!(
                "QUERY\n  tables: {}\n  marker: {:?}\n  sql: {}\n  args: {}",
                self.tables,
                self.marker,
                indent_sql(self.sql()),
                display_args(self.args())
            )
        });
        self.shared.storage.query(self.sql(), self.args())
    }
}

impl<M: Marker> Clone for MarkedQuery<M> {
    fn clone(&self) -> Self {
        Self {
            marker: self.marker.clone(),
            tables: self.tables.clone(),
            statement: Arc::clone(&self.statement),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: Marker> fmt::Debug for MarkedQuery<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkedQuery")
            .field("marker", &self.marker)
            .field("tables", &self.tables)
            .field("sql", &self.statement.sql)
            .finish()
    }
}

/// Source stream of a live query, before any transformer runs.
pub(crate) struct QueryPipeline<M: Marker> {
    shared: Arc<Shared<M>>,
    tables: TableSet,
    statement: Arc<Statement>,
}

impl<M: Marker> QueryPipeline<M> {
    pub(crate) fn new(shared: Arc<Shared<M>>, tables: TableSet, statement: Statement) -> Self {
        Self {
            shared,
            tables,
            statement: Arc::new(statement),
        }
    }

    fn query_with(&self, marker: Option<M>) -> MarkedQuery<M> {
        MarkedQuery {
            marker,
            tables: self.tables.clone(),
            statement: Arc::clone(&self.statement),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Delivers items to one subscriber on the database's scheduler.
struct Emitter<M: Marker> {
    observer: Arc<Mutex<Box<dyn Observer<MarkedQuery<M>>>>>,
    disposable: Disposable,
    scheduler: Arc<dyn Scheduler>,
}

impl<M: Marker> Emitter<M> {
    fn emit(&self, query: MarkedQuery<M>) {
        if self.disposable.is_disposed() {
            return;
        }
        let observer = Arc::clone(&self.observer);
        let disposable = self.disposable.clone();
        self.scheduler.schedule(Box::new(move || {
            let mut observer = observer.lock();
            if !disposable.is_disposed() {
                observer.on_next(query);
            }
        }));
    }
}

impl<M: Marker> Observable for QueryPipeline<M> {
    type Item = MarkedQuery<M>;

    fn subscribe_observer(&self, mut observer: Box<dyn Observer<Self::Item>>) -> Result<Subscription> {
        if self.shared.in_transaction() {
            return Err(Error::state(
                "Cannot subscribe to observable query in a transaction.",
            ));
        }

        let disposable = Disposable::new();
        observer.on_subscribe(disposable.clone());
        let emitter = Emitter {
            observer: Arc::new(Mutex::new(observer)),
            disposable: disposable.clone(),
            scheduler: Arc::clone(&self.shared.scheduler),
        };

        emitter.emit(self.query_with(None));

        let tables = self.tables.clone();
        let statement = Arc::clone(&self.statement);
        let shared = Arc::clone(&self.shared);
        let id = self.shared.bus.listen(self.tables.clone(), move |trigger| {
            emitter.emit(MarkedQuery {
                marker: Some(trigger.marker.clone()),
                tables: tables.clone(),
                statement: Arc::clone(&statement),
                shared: Arc::clone(&shared),
            });
        });

        let bus = Arc::downgrade(&self.shared.bus);
        disposable.add_hook(move || {
            if let Some(bus) = bus.upgrade() {
                bus.unsubscribe(id);
            }
        });

        Ok(Subscription::new(disposable))
    }
}

/// A live query, as returned by [`Database::create_query`](crate::Database::create_query).
///
/// Subscribe directly to receive [`MarkedQuery`] items, or apply one of the
/// [`QueryMappingExt`](brook_reactive::QueryMappingExt) operators first.
pub struct QueryObservable<M: Marker> {
    inner: BoxObservable<MarkedQuery<M>>,
}

impl<M: Marker> QueryObservable<M> {
    pub(crate) fn new(inner: BoxObservable<MarkedQuery<M>>) -> Self {
        Self { inner }
    }
}

impl<M: Marker> Clone for QueryObservable<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Marker> Observable for QueryObservable<M> {
    type Item = MarkedQuery<M>;

    fn subscribe_observer(&self, observer: Box<dyn Observer<Self::Item>>) -> Result<Subscription> {
        self.inner.subscribe_observer(observer)
    }
}
