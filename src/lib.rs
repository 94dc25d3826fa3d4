//! Wait-free value publication between threads, and a multi-producer
//! accumulator built on top of it.
//!
//! The crate has two layers:
//!
//! - [`Rotator`]: a triple-buffer rotation primitive. One slot is exposed to
//!   the writer, one to the reader, and a hidden relay slot ferries values
//!   between them. Both sides advance the pipeline with O(1), non-blocking,
//!   allocation-free operations; a slow reader coalesces updates
//!   (last-write-wins) instead of queueing them.
//! - [`Collector`]: one rotator per registered producer plus a mutex-guarded
//!   accumulator. Producers mutate their write slot through scoped, reentrant
//!   [`WriteSession`]s without ever taking the lock; `collect()` drains every
//!   producer and returns the running total, resetting it to the identity.
//!
//! Values are merged with the caller-supplied associative [`Combine`]
//! operation; the crate transports and merges values but never interprets
//! them.
//!
//! ```
//! use rotor::Collector;
//!
//! let collector = Collector::<u64>::new();
//!
//! let mut handle = collector.handle();
//! *handle.begin_write() += 5;
//! *handle.begin_write() += 7;
//!
//! assert_eq!(collector.collect(), 12);
//! assert_eq!(collector.collect(), 0);
//! ```

#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    rustdoc::broken_intra_doc_links
)]

mod sync;

mod combine;
pub use crate::combine::Combine;

mod rotator;
pub use crate::rotator::Rotator;

mod collector;
pub use crate::collector::{Collector, ProducerHandle, WriteSession};
