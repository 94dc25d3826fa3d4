use super::{Collector, ProducerShared, WriteSession};
use crate::combine::Combine;
use crate::sync::Arc;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

/// A thread-owned producer registered with a [`Collector`].
///
/// The handle pairs one private rotator with an entry in the collector's
/// registry. Writing goes through [`begin_write`](Self::begin_write) and
/// never touches the collector's lock; only construction and destruction do.
///
/// Dropping the handle folds its remaining contribution into the collector's
/// accumulator exactly once, so nothing is lost when a producer thread goes
/// away between collections.
///
/// A handle is `Send` but deliberately not `Sync`: it belongs to exactly one
/// thread at a time, which makes it a good fit for thread-local storage.
pub struct ProducerHandle<T: Combine> {
    collector: Arc<Collector<T>>,
    producer: Arc<ProducerShared<T>>,
    key: usize,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T: Combine> ProducerHandle<T> {
    pub(crate) fn register(collector: Arc<Collector<T>>) -> Self {
        let producer = Arc::new(ProducerShared::new());
        // Stage the default value so the very first collection cycle already
        // observes this producer's (zero) contribution.
        producer.rotator.force_stage();
        let key = collector
            .registry
            .lock()
            .unwrap()
            .producers
            .insert(Arc::clone(&producer));
        Self {
            collector,
            producer,
            key,
            _not_sync: PhantomData,
        }
    }

    /// Opens a write session over this producer's current write slot.
    ///
    /// Wait-free: a counter bump and an index load, no lock, no allocation.
    /// Nested access from within a session goes through
    /// [`WriteSession::reborrow`].
    pub fn begin_write(&mut self) -> WriteSession<'_, T> {
        WriteSession::enter(&self.producer)
    }

    /// The collector this producer feeds.
    pub fn collector(&self) -> &Arc<Collector<T>> {
        &self.collector
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &ProducerShared<T> {
        &self.producer
    }
}

impl<T: Combine> Drop for ProducerHandle<T> {
    fn drop(&mut self) {
        // Fold-then-unregister, under the same lock collect() takes: the
        // contribution lands in the accumulator exactly once.
        let mut registry = self.collector.registry.lock().unwrap();
        let contribution = self.producer.extract();
        registry.total.combine(contribution);
        registry.producers.remove(self.key);
    }
}

impl<T: Combine> fmt::Debug for ProducerHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
