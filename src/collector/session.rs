use super::ProducerShared;
use crate::combine::Combine;
use crate::sync::{fence, Ordering};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// A scoped, reentrant capability for mutating a producer's write slot.
///
/// The session dereferences to the slot claimed when the outermost session
/// was opened; [`reborrow`](Self::reborrow) hands out nested sessions over
/// the *same* slot, so the buffer identity backing a transaction never
/// changes until the outermost session ends. Only the outermost drop
/// attempts a publish.
///
/// Sessions are neither `Send` nor `Sync`; they nest within one thread.
pub struct WriteSession<'p, T: Combine> {
    producer: &'p ProducerShared<T>,
    slot: *mut T,
    _not_send: PhantomData<*mut T>,
}

impl<'p, T: Combine> WriteSession<'p, T> {
    pub(crate) fn enter(producer: &'p ProducerShared<T>) -> Self {
        debug_assert_eq!(producer.depth.get(), 0, "only reborrow nests sessions");
        producer.depth.set(1);
        // Odd epoch marks the session open; the fence orders the mark before
        // the slot claim so extraction either sees the odd epoch or has
        // already swapped the slot we are about to load.
        producer.epoch.fetch_add(1, Ordering::AcqRel);
        fence(Ordering::SeqCst);
        let slot = producer.rotator.write_slot_ptr();
        Self {
            producer,
            slot,
            _not_send: PhantomData,
        }
    }

    /// Opens a nested session over the same write slot.
    ///
    /// The borrow checker keeps the nesting well-formed (the outer session is
    /// unusable until the nested one is dropped); the depth counter makes the
    /// publish fire only when the outermost session ends.
    pub fn reborrow(&mut self) -> WriteSession<'_, T> {
        self.producer.depth.set(self.producer.depth.get() + 1);
        WriteSession {
            producer: self.producer,
            slot: self.slot,
            _not_send: PhantomData,
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &ProducerShared<T> {
        self.producer
    }
}

impl<T: Combine> Deref for WriteSession<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // The slot was claimed while the epoch is odd; extraction never
        // touches a committed slot before the epoch moves on.
        unsafe { &*self.slot }
    }
}

impl<T: Combine> DerefMut for WriteSession<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.slot }
    }
}

impl<T: Combine> Drop for WriteSession<'_, T> {
    fn drop(&mut self) {
        let depth = self.producer.depth.get() - 1;
        self.producer.depth.set(depth);
        if depth == 0 {
            // Best effort: fires only while the relay is free. Otherwise the
            // data stays in the write slot, where later sessions keep
            // accumulating until extraction flushes it.
            self.producer.rotator.commit();
            self.producer.epoch.fetch_add(1, Ordering::Release);
        }
    }
}

impl<T: Combine> fmt::Debug for WriteSession<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSession")
            .field("depth", &self.producer.depth.get())
            .finish_non_exhaustive()
    }
}
