//! Mapping operators.
//!
//! These turn a stream of lazily evaluated queries into a stream of typed results. Each
//! item is evaluated once: the query runs, the cursor is walked, and the cursor is closed
//! before anything is signalled downstream.
//!
//! | operator                | zero rows     | one row  | two or more rows  |
//! |-------------------------|---------------|----------|-------------------|
//! | `map_to_list`           | empty list    | `[v]`    | `[v, ...]`        |
//! | `map_to_one`            | nothing       | `v`      | cardinality error |
//! | `map_to_one_or_default` | default       | `v`      | cardinality error |
//! | `map_to_optional`       | `None`        | `Some(v)`| cardinality error |

use crate::observable::{Observable, Observer};
use crate::plugins;
use crate::subscription::{Disposable, Subscription};
use brook_core::{Error, Result, Row};
use brook_storage::RowCursor;
use std::marker::PhantomData;
use std::sync::Arc;

const MORE_THAN_ONE_ROW: &str = "Cursor returned more than 1 row";
const LIST_MAPPER_NULL: &str = "QueryToList mapper returned null";
const ONE_MAPPER_NULL: &str = "QueryToOne mapper returned null";

/// A read that can be evaluated any number of times.
pub trait Query: Send + 'static {
    /// Runs the read. `None` means storage produced no result set.
    fn run(&self) -> Result<Option<Box<dyn RowCursor>>>;
}

/// Closes a cursor exactly once: explicitly through `release`, otherwise on drop.
pub struct CursorGuard {
    cursor: Option<Box<dyn RowCursor>>,
}

impl CursorGuard {
    /// Takes ownership of a cursor.
    pub fn new(cursor: Box<dyn RowCursor>) -> Self {
        Self {
            cursor: Some(cursor),
        }
    }

    /// Row-count hint of the underlying cursor.
    pub fn count_hint(&self) -> Option<usize> {
        self.cursor.as_ref().and_then(|c| c.count_hint())
    }

    /// Advances the cursor. A released guard has no rows.
    pub fn move_to_next(&mut self) -> Result<bool> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.move_to_next(),
            None => Ok(false),
        }
    }

    /// Returns the current row.
    pub fn current(&self) -> Result<&Row> {
        self.cursor
            .as_ref()
            .and_then(|c| c.current())
            .ok_or_else(|| Error::state("Cursor is not positioned on a row"))
    }

    /// Closes the cursor now.
    pub fn release(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// How a cursor becomes one downstream item.
pub trait CursorMapping: Send + Sync + 'static {
    /// Item produced per evaluated query.
    type Output: Send + 'static;

    /// Maps an open cursor. `Ok(None)` emits nothing.
    fn apply(&self, cursor: &mut CursorGuard) -> Result<Option<Self::Output>>;

    /// Maps a query that produced no result set. `Ok(None)` emits nothing.
    fn apply_missing(&self) -> Result<Option<Self::Output>> {
        Ok(None)
    }
}

fn map_row<T, F>(mapper: &F, row: &Row, null_message: &str) -> Result<T>
where
    F: Fn(&Row) -> Result<Option<T>>,
{
    mapper(row)?.ok_or_else(|| Error::mapping(null_message))
}

/// Reads at most one row, failing as soon as a second row is seen.
fn map_single<T, F>(mapper: &F, cursor: &mut CursorGuard) -> Result<Option<T>>
where
    F: Fn(&Row) -> Result<Option<T>>,
{
    if !cursor.move_to_next()? {
        return Ok(None);
    }
    let value = map_row(mapper, cursor.current()?, ONE_MAPPER_NULL)?;
    if cursor.move_to_next()? {
        return Err(Error::cardinality(MORE_THAN_ONE_ROW));
    }
    Ok(Some(value))
}

/// Every row into a `Vec`.
pub struct ToList<F, T> {
    mapper: F,
    _item: PhantomData<fn() -> T>,
}

impl<F, T> CursorMapping for ToList<F, T>
where
    F: Fn(&Row) -> Result<Option<T>> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = Vec<T>;

    fn apply(&self, cursor: &mut CursorGuard) -> Result<Option<Vec<T>>> {
        let mut items = Vec::with_capacity(cursor.count_hint().unwrap_or(0));
        while cursor.move_to_next()? {
            items.push(map_row(&self.mapper, cursor.current()?, LIST_MAPPER_NULL)?);
        }
        Ok(Some(items))
    }

    fn apply_missing(&self) -> Result<Option<Vec<T>>> {
        Ok(Some(Vec::new()))
    }
}

/// Every row into a caller-built collection.
pub struct ToSpecificList<F, N, T, C> {
    mapper: F,
    new_list: N,
    _item: PhantomData<fn() -> (T, C)>,
}

impl<F, N, T, C> CursorMapping for ToSpecificList<F, N, T, C>
where
    F: Fn(&Row) -> Result<Option<T>> + Send + Sync + 'static,
    N: Fn(usize) -> C + Send + Sync + 'static,
    T: Send + 'static,
    C: Extend<T> + Send + 'static,
{
    type Output = C;

    fn apply(&self, cursor: &mut CursorGuard) -> Result<Option<C>> {
        let mut items = (self.new_list)(cursor.count_hint().unwrap_or(0));
        while cursor.move_to_next()? {
            let item = map_row(&self.mapper, cursor.current()?, LIST_MAPPER_NULL)?;
            items.extend(std::iter::once(item));
        }
        Ok(Some(items))
    }

    fn apply_missing(&self) -> Result<Option<C>> {
        Ok(Some((self.new_list)(0)))
    }
}

/// Exactly one row; zero rows emit nothing.
pub struct ToOne<F, T> {
    mapper: F,
    _item: PhantomData<fn() -> T>,
}

impl<F, T> CursorMapping for ToOne<F, T>
where
    F: Fn(&Row) -> Result<Option<T>> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn apply(&self, cursor: &mut CursorGuard) -> Result<Option<T>> {
        map_single(&self.mapper, cursor)
    }
}

/// Exactly one row; zero rows emit the default.
pub struct ToOneOrDefault<F, T> {
    mapper: F,
    default: T,
}

impl<F, T> CursorMapping for ToOneOrDefault<F, T>
where
    F: Fn(&Row) -> Result<Option<T>> + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn apply(&self, cursor: &mut CursorGuard) -> Result<Option<T>> {
        Ok(Some(
            map_single(&self.mapper, cursor)?.unwrap_or_else(|| self.default.clone()),
        ))
    }

    fn apply_missing(&self) -> Result<Option<T>> {
        Ok(Some(self.default.clone()))
    }
}

/// At most one row, as an `Option`.
pub struct ToOptional<F, T> {
    mapper: F,
    _item: PhantomData<fn() -> T>,
}

impl<F, T> CursorMapping for ToOptional<F, T>
where
    F: Fn(&Row) -> Result<Option<T>> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = Option<T>;

    fn apply(&self, cursor: &mut CursorGuard) -> Result<Option<Option<T>>> {
        map_single(&self.mapper, cursor).map(Some)
    }

    fn apply_missing(&self) -> Result<Option<Option<T>>> {
        Ok(Some(None))
    }
}

/// An observable of queries mapped through a `CursorMapping`.
pub struct Mapped<O, K> {
    source: O,
    mapping: Arc<K>,
}

impl<O, K> Observable for Mapped<O, K>
where
    O: Observable,
    O::Item: Query,
    K: CursorMapping,
{
    type Item = K::Output;

    fn subscribe_observer(&self, observer: Box<dyn Observer<K::Output>>) -> Result<Subscription> {
        self.source.subscribe_observer(Box::new(MappingObserver {
            downstream: observer,
            mapping: Arc::clone(&self.mapping),
            upstream: None,
            done: false,
            _query: PhantomData,
        }))
    }
}

struct MappingObserver<Q, K: CursorMapping> {
    downstream: Box<dyn Observer<K::Output>>,
    mapping: Arc<K>,
    upstream: Option<Disposable>,
    done: bool,
    _query: PhantomData<fn(Q)>,
}

impl<Q, K: CursorMapping> MappingObserver<Q, K> {
    fn is_disposed(&self) -> bool {
        self.upstream.as_ref().map_or(false, Disposable::is_disposed)
    }

    fn evaluate(&self, query: &Q) -> Result<Option<K::Output>>
    where
        Q: Query,
    {
        match query.run()? {
            Some(cursor) => {
                let mut guard = CursorGuard::new(cursor);
                let result = self.mapping.apply(&mut guard);
                guard.release();
                result
            }
            None => self.mapping.apply_missing(),
        }
    }

    fn fail(&mut self, error: Error) {
        self.done = true;
        if self.is_disposed() {
            plugins::report_error(error);
            return;
        }
        if let Some(upstream) = &self.upstream {
            upstream.dispose();
        }
        self.downstream.on_error(error);
    }
}

impl<Q, K> Observer<Q> for MappingObserver<Q, K>
where
    Q: Query,
    K: CursorMapping,
{
    fn on_subscribe(&mut self, disposable: Disposable) {
        self.upstream = Some(disposable.clone());
        self.downstream.on_subscribe(disposable);
    }

    fn on_next(&mut self, query: Q) {
        if self.done {
            return;
        }
        match self.evaluate(&query) {
            Ok(Some(item)) => {
                if !self.is_disposed() {
                    self.downstream.on_next(item);
                }
            }
            Ok(None) => {}
            Err(error) => self.fail(error),
        }
    }

    fn on_error(&mut self, error: Error) {
        if self.done {
            plugins::report_error(error);
            return;
        }
        self.done = true;
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.downstream.on_complete();
    }
}

/// Mapping operators for observables of queries.
///
/// Mappers return `Ok(None)` to signal a missing value, which fails the stream with a
/// mapping error.
pub trait QueryMappingExt: Observable + Sized
where
    Self::Item: Query,
{
    /// Maps every row of each result into a `Vec`, in row order.
    fn map_to_list<F, T>(self, mapper: F) -> Mapped<Self, ToList<F, T>>
    where
        F: Fn(&Row) -> Result<Option<T>> + Send + Sync + 'static,
        T: Send + 'static,
    {
        Mapped {
            source: self,
            mapping: Arc::new(ToList {
                mapper,
                _item: PhantomData,
            }),
        }
    }

    /// Maps every row into a collection created by `new_list`, which receives the
    /// cursor's row-count hint.
    fn map_to_specific_list<F, N, T, C>(
        self,
        mapper: F,
        new_list: N,
    ) -> Mapped<Self, ToSpecificList<F, N, T, C>>
    where
        F: Fn(&Row) -> Result<Option<T>> + Send + Sync + 'static,
        N: Fn(usize) -> C + Send + Sync + 'static,
        T: Send + 'static,
        C: Extend<T> + Send + 'static,
    {
        Mapped {
            source: self,
            mapping: Arc::new(ToSpecificList {
                mapper,
                new_list,
                _item: PhantomData,
            }),
        }
    }

    /// Maps a result of exactly one row. Results with zero rows emit nothing.
    fn map_to_one<F, T>(self, mapper: F) -> Mapped<Self, ToOne<F, T>>
    where
        F: Fn(&Row) -> Result<Option<T>> + Send + Sync + 'static,
        T: Send + 'static,
    {
        Mapped {
            source: self,
            mapping: Arc::new(ToOne {
                mapper,
                _item: PhantomData,
            }),
        }
    }

    /// Maps a result of exactly one row, emitting `default` for zero rows.
    ///
    /// Fails with a configuration error if `default` is `None`.
    fn map_to_one_or_default<F, T>(
        self,
        mapper: F,
        default: impl Into<Option<T>>,
    ) -> Result<Mapped<Self, ToOneOrDefault<F, T>>>
    where
        F: Fn(&Row) -> Result<Option<T>> + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let default = default
            .into()
            .ok_or_else(|| Error::configuration("defaultValue == null"))?;
        Ok(Mapped {
            source: self,
            mapping: Arc::new(ToOneOrDefault { mapper, default }),
        })
    }

    /// Maps a result of at most one row into an `Option`.
    fn map_to_optional<F, T>(self, mapper: F) -> Mapped<Self, ToOptional<F, T>>
    where
        F: Fn(&Row) -> Result<Option<T>> + Send + Sync + 'static,
        T: Send + 'static,
    {
        Mapped {
            source: self,
            mapping: Arc::new(ToOptional {
                mapper,
                _item: PhantomData,
            }),
        }
    }
}

impl<O> QueryMappingExt for O
where
    O: Observable,
    O::Item: Query,
{
}
