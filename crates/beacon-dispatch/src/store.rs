//! Durable queue abstraction for undelivered events.
//!
//! The dispatcher only depends on the [`EventStore`] contract: one
//! append-at-tail / remove-at-head FIFO per event kind. Production deployments
//! plug in whatever durable backend they have; [`memory::InMemoryEventStore`]
//! is the in-tree reference implementation and the test double.

use std::{future::Future, pin::Pin};

use beacon_core::{error::Result, Event, EventKind};

/// Durable FIFO-per-kind queue operations required by the dispatcher.
///
/// Implementations must be safe for concurrent calls from multiple dispatch
/// and flush paths; the pipeline adds no locking of its own around the store
/// beyond flush-cycle serialization.
pub trait EventStore: Send + Sync + 'static {
    /// Appends an event at the tail of its kind's queue.
    fn save(
        &self,
        event: Event,
        kind: EventKind,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Number of events currently queued for a kind.
    fn count(&self, kind: EventKind) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + '_>>;

    /// All queued events for a kind, oldest first.
    fn list_all(
        &self,
        kind: EventKind,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>>> + Send + '_>>;

    /// Removes the oldest queued event of a kind.
    ///
    /// Removal is positional, never by event identity. Removing from an
    /// already-empty queue is a no-op, so a stale removal arriving after an
    /// earlier success must not fail.
    fn remove_oldest(
        &self,
        kind: EventKind,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

pub mod memory {
    //! In-memory store implementation.
    //!
    //! Reference implementation of the store contract, also used as the test
    //! double. Supports injecting a one-shot failure per operation to
    //! exercise the pipeline's store-degradation paths.

    use std::{
        collections::{HashMap, VecDeque},
        future::Future,
        pin::Pin,
        sync::Arc,
    };

    use beacon_core::{error::Result, Event, EventKind, StoreError};
    use tokio::sync::RwLock;

    use super::EventStore;

    /// Store operation selector for error injection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum StoreOp {
        /// [`EventStore::save`]
        Save,
        /// [`EventStore::count`]
        Count,
        /// [`EventStore::list_all`]
        ListAll,
        /// [`EventStore::remove_oldest`]
        RemoveOldest,
    }

    /// Thread-safe in-memory FIFO queue per event kind.
    #[derive(Debug, Default)]
    pub struct InMemoryEventStore {
        queues: Arc<RwLock<HashMap<EventKind, VecDeque<Event>>>>,
        injected_errors: Arc<RwLock<HashMap<StoreOp, String>>>,
    }

    impl InMemoryEventStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next call of `op` fail with an I/O error.
        ///
        /// The injected error is consumed by that one call; subsequent calls
        /// succeed again.
        pub async fn inject_error(&self, op: StoreOp, message: impl Into<String>) {
            self.injected_errors.write().await.insert(op, message.into());
        }

        async fn take_injected(&self, op: StoreOp) -> Result<()> {
            match self.injected_errors.write().await.remove(&op) {
                Some(message) => Err(StoreError::io(message)),
                None => Ok(()),
            }
        }
    }

    impl EventStore for InMemoryEventStore {
        fn save(
            &self,
            event: Event,
            kind: EventKind,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.take_injected(StoreOp::Save).await?;
                self.queues.write().await.entry(kind).or_default().push_back(event);
                Ok(())
            })
        }

        fn count(
            &self,
            kind: EventKind,
        ) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + '_>> {
            Box::pin(async move {
                self.take_injected(StoreOp::Count).await?;
                Ok(self.queues.read().await.get(&kind).map_or(0, VecDeque::len))
            })
        }

        fn list_all(
            &self,
            kind: EventKind,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>>> + Send + '_>> {
            Box::pin(async move {
                self.take_injected(StoreOp::ListAll).await?;
                Ok(self
                    .queues
                    .read()
                    .await
                    .get(&kind)
                    .map(|queue| queue.iter().cloned().collect())
                    .unwrap_or_default())
            })
        }

        fn remove_oldest(
            &self,
            kind: EventKind,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.take_injected(StoreOp::RemoveOldest).await?;
                if let Some(queue) = self.queues.write().await.get_mut(&kind) {
                    queue.pop_front();
                }
                Ok(())
            })
        }
    }

}
