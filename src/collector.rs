use crate::combine::Combine;
use crate::rotator::Rotator;
use crate::sync::{fence, Arc, AtomicUsize, Mutex, Ordering};
use std::cell::Cell;
use std::fmt;
use std::mem;

mod handle;
pub use handle::ProducerHandle;

mod session;
pub use session::WriteSession;

/// State shared between a producer handle and the collector's registry.
///
/// The rotator and epoch are the cross-thread rendezvous; `depth` is only
/// ever touched by the thread that owns the handle.
pub(crate) struct ProducerShared<T> {
    rotator: Rotator<T>,
    /// Odd while a write session is open; the slow extraction side waits this
    /// out, the fast session side never blocks.
    epoch: AtomicUsize,
    depth: Cell<usize>,
}

// `depth` is confined to the handle-owning thread; everything else is atomic
// or mediated by the rotator's own protocol.
unsafe impl<T: Send> Sync for ProducerShared<T> {}

impl<T: Combine> ProducerShared<T> {
    fn new() -> Self {
        Self {
            rotator: Rotator::new(),
            epoch: AtomicUsize::new(0),
            depth: Cell::new(0),
        }
    }

    /// Flushes and resets this producer's entire pending contribution.
    ///
    /// Caller must hold the collector lock (or be the owning thread itself,
    /// as in handle destruction); extraction is the only reader-side actor on
    /// the rotator.
    fn extract(&self) -> T {
        let mut out = T::default();
        // Drain whatever the producer has already published, then commit the
        // write slot itself. A session ending between the two steps can slip
        // in one more publish; the loop re-drains it before retrying.
        loop {
            if self.rotator.consume() {
                out.combine(unsafe { self.rotator.take_read() });
            }
            if self.rotator.commit() {
                break;
            }
        }
        // The slot just committed may still be referenced by one in-flight
        // session; any session entered after the commit sees the replacement
        // slot. Wait that one session out before touching the contents.
        fence(Ordering::SeqCst);
        let epoch = self.epoch.load(Ordering::Acquire);
        if epoch & 1 == 1 {
            let mut iter = 0;
            while self.epoch.load(Ordering::Acquire) == epoch {
                if iter < 20 {
                    iter += 1;
                } else {
                    crate::sync::yield_now();
                }
            }
        }
        let consumed = self.rotator.consume();
        debug_assert!(consumed, "nothing but extraction consumes under the lock");
        out.combine(unsafe { self.rotator.take_read() });
        out
    }
}

struct Registry<T> {
    total: T,
    producers: slab::Slab<Arc<ProducerShared<T>>>,
}

/// A shared accumulator fed by any number of single-threaded producers.
///
/// Each producer thread holds its own [`ProducerHandle`]; writes go through a
/// per-producer [`Rotator`] and never touch the collector's lock. Only handle
/// registration, handle destruction and [`collect`](Self::collect) take the
/// lock.
///
/// Every unit of data whose outermost session ended before a `collect` call
/// is included in that call or a strictly later one — at most one generation
/// of staleness — and no unit is ever counted twice. Contributions from
/// different producers are folded in unspecified order, so a non-commutative
/// [`Combine`] must not rely on it.
pub struct Collector<T> {
    registry: Mutex<Registry<T>>,
}

impl<T: Combine> Collector<T> {
    /// Creates a collector with a `T::default()` accumulator and no
    /// registered producers.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(Registry {
                total: T::default(),
                producers: slab::Slab::new(),
            }),
        })
    }

    /// Registers a new producer.
    ///
    /// The handle is owned by the calling thread (commonly stashed in
    /// thread-local storage) and keeps the collector alive for as long as it
    /// exists.
    pub fn handle(self: &Arc<Self>) -> ProducerHandle<T> {
        ProducerHandle::register(Arc::clone(self))
    }

    /// Drains every registered producer and the shared accumulator,
    /// returning their combined total.
    ///
    /// Callable from any thread, including ones with no producer handle of
    /// their own.
    pub fn collect(&self) -> T {
        let mut registry = self.registry.lock().unwrap();
        let registry = &mut *registry;
        for (_, producer) in registry.producers.iter() {
            registry.total.combine(producer.extract());
        }
        mem::take(&mut registry.total)
    }
}

impl<T> fmt::Debug for Collector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector").finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::Collector;
    use crate::sync::Ordering;

    #[test]
    fn session_epoch_parity() {
        let collector = Collector::<u64>::new();
        let mut handle = collector.handle();
        assert_eq!(handle.shared().epoch.load(Ordering::Relaxed) & 1, 0);
        {
            let mut session = handle.begin_write();
            *session += 1;
            assert_eq!(session.shared().epoch.load(Ordering::Relaxed) & 1, 1);
            {
                let nested = session.reborrow();
                assert_eq!(nested.shared().epoch.load(Ordering::Relaxed) & 1, 1);
            }
            assert_eq!(session.shared().epoch.load(Ordering::Relaxed) & 1, 1);
        }
        assert_eq!(handle.shared().epoch.load(Ordering::Relaxed) & 1, 0);
        assert_eq!(handle.shared().depth.get(), 0);
    }

    #[test]
    fn extraction_resets_every_slot() {
        let collector = Collector::<u64>::new();
        let mut handle = collector.handle();
        for _ in 0..5 {
            *handle.begin_write() += 2;
        }
        assert_eq!(collector.collect(), 10);
        assert_eq!(collector.collect(), 0);
        *handle.begin_write() += 1;
        assert_eq!(collector.collect(), 1);
    }
}
