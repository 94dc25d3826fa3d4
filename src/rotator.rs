use crate::sync::{AtomicU8, Ordering};
use std::cell::UnsafeCell;
use std::fmt;
use std::mem;

/// Relay tag bit in the packed state word.
const STAGED: u8 = 0b1;

/// Packs the write-slot index, the relay-slot index and the relay tag into
/// one byte. The read-slot index is implied: the three indices always form
/// the set `{0, 1, 2}`, so `read = 3 - write - relay`.
#[inline]
fn pack(write: u8, relay: u8, staged: bool) -> u8 {
    debug_assert!(write < 3 && relay < 3 && write != relay);
    (write << 3) | (relay << 1) | u8::from(staged)
}

#[inline]
fn write_of(state: u8) -> u8 {
    state >> 3
}

#[inline]
fn relay_of(state: u8) -> u8 {
    (state >> 1) & 0b11
}

#[inline]
fn read_of(state: u8) -> u8 {
    3 - write_of(state) - relay_of(state)
}

#[inline]
fn is_staged(state: u8) -> bool {
    state & STAGED != 0
}

/// A wait-free triple-buffer rotation primitive.
///
/// A `Rotator` owns exactly three storage slots of type `T`. One slot is
/// exposed for writing, one for reading, and the third — the *relay* —
/// ferries values from the writer to the reader without ever blocking either
/// side. The relay is either `Free` (available to be claimed as the next
/// write slot) or `Staged` (holding a value the writer published that the
/// reader has not yet consumed).
///
/// All three slots are constructed with `T::default()` and live for the
/// rotator's whole lifetime; no allocation happens after construction. Role
/// reassignment is an index/tag update on a single atomic word, so every
/// operation is O(1) and non-blocking.
///
/// If the reader lags, newer publishes coalesce: the staged value is replaced
/// by the latest write (last-write-wins) rather than queued. At most one
/// generation is ever in flight.
///
/// On a freshly constructed rotator the relay starts out `Free`: the first
/// [`try_publish`](Self::try_publish) succeeds and the first
/// [`try_consume`](Self::try_consume) reports nothing to consume.
pub struct Rotator<T> {
    slots: [UnsafeCell<T>; 3],
    state: AtomicU8,
}

// The packed state word serializes role handoff between the writer side and
// the reader side; a slot is only ever dereferenced by the side that
// currently owns its role. Values move across threads, hence `T: Send`.
unsafe impl<T: Send> Send for Rotator<T> {}
unsafe impl<T: Send> Sync for Rotator<T> {}

impl<T: Default> Rotator<T> {
    /// Creates a rotator with all three slots holding `T::default()`.
    pub fn new() -> Self {
        Self {
            slots: [
                UnsafeCell::new(T::default()),
                UnsafeCell::new(T::default()),
                UnsafeCell::new(T::default()),
            ],
            state: AtomicU8::new(pack(0, 2, false)),
        }
    }
}

impl<T: Default> Default for Rotator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Rotator<T> {
    /// Returns the current write slot.
    ///
    /// The reference is stable across repeated calls until a publish rotates
    /// the slot out. Never blocks.
    pub fn write_slot(&mut self) -> &mut T {
        let state = self.state.load(Ordering::Relaxed);
        unsafe { &mut *self.slots[write_of(state) as usize].get() }
    }

    /// Returns the current read slot.
    ///
    /// Mutable so the reader can drain or reset the value in place. Stable
    /// until a consume rotates it. Never blocks.
    pub fn read_slot(&mut self) -> &mut T {
        let state = self.state.load(Ordering::Relaxed);
        unsafe { &mut *self.slots[read_of(state) as usize].get() }
    }

    /// Attempts to advance the write-to-read pipeline by one stage.
    ///
    /// If the relay is `Free`, the value just written becomes the staged
    /// relay value, the previously free slot (holding whatever was left over
    /// from two rotations ago) becomes the new write slot, and the call
    /// returns `true`.
    ///
    /// If the relay is still `Staged`, the call returns `false` and the
    /// pending value is replaced by the current write slot (last-write-wins);
    /// intermediate values are never queued.
    pub fn try_publish(&mut self) -> bool {
        self.publish_swap()
    }

    /// Attempts to expose the staged value through the read slot.
    ///
    /// If the relay is `Staged`, the staged value becomes the read slot, the
    /// previously exposed read slot becomes the relay (marked `Free`), and
    /// the call returns `true`. If the relay is `Free` there is nothing new
    /// and the call returns `false`.
    pub fn try_consume(&mut self) -> bool {
        self.consume()
    }

    /// Unconditionally marks the relay slot `Staged`, whatever its prior
    /// state.
    ///
    /// Bootstrap only: it lets a first [`try_consume`](Self::try_consume)
    /// succeed (yielding the relay's default value) before any real publish
    /// has occurred.
    pub fn force_make_readable(&mut self) {
        self.force_stage();
    }

    /// Publish with last-write-wins coalescing: the write and relay slots
    /// swap identities and the relay is tagged `Staged` regardless of its
    /// prior tag. Returns whether the relay was `Free`, i.e. whether the
    /// pipeline advanced rather than replaced.
    pub(crate) fn publish_swap(&self) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            let next = pack(relay_of(cur), write_of(cur), true);
            match self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return !is_staged(cur),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Publish that fires only while the relay is `Free`; a pending staged
    /// value is left untouched. This is the flavor session teardown and
    /// extraction use: values accumulate in the write slot until the reader
    /// side frees the relay, so nothing committed is ever displaced.
    pub(crate) fn commit(&self) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            if is_staged(cur) {
                return false;
            }
            let next = pack(relay_of(cur), write_of(cur), true);
            match self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    pub(crate) fn consume(&self) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            if !is_staged(cur) {
                return false;
            }
            let next = pack(write_of(cur), read_of(cur), false);
            match self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    pub(crate) fn force_stage(&self) {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            if is_staged(cur) {
                return;
            }
            match self.state.compare_exchange_weak(
                cur,
                cur | STAGED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Raw pointer to the current write slot. The `SeqCst` load pairs with
    /// the extraction side's commit + fence so a session entered after a
    /// commit cannot observe the pre-commit slot.
    pub(crate) fn write_slot_ptr(&self) -> *mut T {
        let state = self.state.load(Ordering::SeqCst);
        self.slots[write_of(state) as usize].get()
    }

    /// Swaps the read slot's value out for `T::default()`.
    ///
    /// # Safety
    ///
    /// The caller must be the sole reader-side actor (extraction happens
    /// under the collector lock) and must not hold a reference into the read
    /// slot across a consume.
    pub(crate) unsafe fn take_read(&self) -> T
    where
        T: Default,
    {
        let state = self.state.load(Ordering::Acquire);
        mem::take(&mut *self.slots[read_of(state) as usize].get())
    }
}

impl<T> fmt::Debug for Rotator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Ordering::Relaxed);
        f.debug_struct("Rotator")
            .field("write", &write_of(state))
            .field("read", &read_of(state))
            .field("relay", &relay_of(state))
            .field("staged", &is_staged(state))
            .finish()
    }
}
