//! Entry point: configure once, then wrap any number of storage handles.

use crate::database::Database;
use crate::logger::{Logger, TracingLogger};
use crate::query::{MarkedQuery, QueryTransformer};
use brook_core::Marker;
use brook_reactive::{BoxObservable, Scheduler};
use brook_storage::StorageHandle;
use std::fmt;
use std::sync::Arc;

/// Factory for [`Database`]s sharing one logger and query transformer.
pub struct Brook<M: Marker> {
    logger: Arc<dyn Logger>,
    transformer: QueryTransformer<M>,
}

impl<M: Marker> Brook<M> {
    /// Starts a builder with the tracing logger and no query transformer.
    pub fn builder() -> BrookBuilder<M> {
        BrookBuilder::new()
    }

    /// Wraps `storage`. Query items are delivered on `scheduler`.
    pub fn wrap_storage<S, C>(&self, storage: S, scheduler: C) -> Database<M>
    where
        S: StorageHandle,
        C: Scheduler,
    {
        self.wrap_shared_storage(Arc::new(storage), Arc::new(scheduler))
    }

    /// Like [`wrap_storage`](Brook::wrap_storage), for handles that are already shared.
    pub fn wrap_shared_storage(
        &self,
        storage: Arc<dyn StorageHandle>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Database<M> {
        Database::new(
            storage,
            scheduler,
            Arc::clone(&self.logger),
            Arc::clone(&self.transformer),
        )
    }
}

impl<M: Marker> Default for Brook<M> {
    fn default() -> Self {
        BrookBuilder::new().build()
    }
}

impl<M: Marker> fmt::Debug for Brook<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Brook").finish_non_exhaustive()
    }
}

/// Builder for [`Brook`].
pub struct BrookBuilder<M: Marker> {
    logger: Arc<dyn Logger>,
    transformer: QueryTransformer<M>,
}

impl<M: Marker> BrookBuilder<M> {
    pub fn new() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            transformer: Arc::new(|queries: BoxObservable<MarkedQuery<M>>| queries),
        }
    }

    /// Sets the sink for engine log lines.
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Sets a function applied to every live query's stream at creation.
    pub fn query_transformer<F>(mut self, transformer: F) -> Self
    where
        F: Fn(BoxObservable<MarkedQuery<M>>) -> BoxObservable<MarkedQuery<M>>
            + Send
            + Sync
            + 'static,
    {
        self.transformer = Arc::new(transformer);
        self
    }

    pub fn build(self) -> Brook<M> {
        Brook {
            logger: self.logger,
            transformer: self.transformer,
        }
    }
}

impl<M: Marker> Default for BrookBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}
