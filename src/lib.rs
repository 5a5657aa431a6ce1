//! A lock-free multi-producer multi-consumer FIFO queue with hazard pointer
//! based concurrent memory reclamation.
//!
//! A difficult problem that has to be considered when implementing lock-free
//! collections or data structures is deciding, when a removed entry can be
//! safely deallocated.
//! It is usually not correct to deallocate removed entries right away, because
//! different threads might still hold references to such entries and could
//! consequently access already freed memory.
//!
//! The Hazard-pointer reclamation scheme was described by Maged M. Michael in
//! 2004 [[1]].
//! It requires every *read* of an entry from shared memory to be accompanied by
//! a global announcement marking the read entry as protected.
//! Threads must store removed (retired) entries in a local cache and regularly
//! attempt to reclaim all cached records in bulk.
//! A record is safe to be reclaimed, once there is no hazard pointer protecting
//! it anymore.
//!
//! # Queue
//!
//! The primary type exposed by this crate is the unbounded [`MpmcQueue`],
//! which can be shared by any number of producer and consumer threads.
//! Producers link new nodes at the tail, consumers claim the value stored in
//! the current head node and unlink it.
//! Unlinked nodes are handed over to the reclamation scheme and de-allocated
//! once no consumer can access them anymore.
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use hazqueue::MpmcQueue;
//!
//! let queue = Arc::new(MpmcQueue::new());
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || (0..100).for_each(|i| queue.enqueue(i)))
//! };
//!
//! let sum: u32 = (0..100).map(|_| queue.dequeue()).sum();
//! producer.join().unwrap();
//! assert_eq!(sum, 4950);
//! ```
//!
//! # Hazard Pointers
//!
//! The reclamation scheme is exposed through the [`HazardPointer`] type and can
//! be used for other lock-free data structures as well.
//! A hazard pointer owns a globally visible record through which it protects
//! one pointer at a time.
//! Unlinked values are scheduled for deletion with
//! [`schedule_deletion`][HazardPointer::schedule_deletion] and are reclaimed
//! by the retiring thread, once a scan of all records finds no protection.
//! Records left behind by exiting threads are adopted by other threads.
//!
//! The reclamation can be tuned through a [`Config`], which is set once for the
//! entire process through the [`CONFIG`] cell.
//!
//! [1]: https://dl.acm.org/citation.cfm?id=987595

#![warn(missing_docs)]

mod config;
mod global;
mod hazard;
mod local;
mod pointer;
mod queue;
mod retired;
mod stack;
mod trace;

pub use crate::config::{Config, ConfigBuilder, ConfigError, CONFIG};
pub use crate::pointer::{
    active_records, allocated_records, flush, retired_count, schedule_deletion_with, HazardPointer,
};
pub use crate::queue::{ConcurrentQueue, Iter, MpmcQueue, WaitStrategy};
pub use crate::retired::Deleter;
pub use crate::trace::init_tracing;

use cfg_if::cfg_if;

// The ThreadSanitizer can not correctly asses ordering restraints from explicit
// fences, so memory operations around such fences need stricter ordering than
// `Relaxed`, when instrumentation is chosen.

cfg_if! {
    if #[cfg(feature = "sanitize-threads")] {
        mod sanitize {
            use core::sync::atomic::Ordering;

            pub const RELAXED_LOAD: Ordering = Ordering::Acquire;
            pub const RELAXED_STORE: Ordering = Ordering::Release;

            pub const RELEASE_SUCCESS: Ordering = Ordering::AcqRel;
            pub const RELEASE_FAIL: Ordering = Ordering::Acquire;
        }
    } else {
        mod sanitize {
            use core::sync::atomic::Ordering;

            pub const RELAXED_LOAD: Ordering = Ordering::Relaxed;
            pub const RELAXED_STORE: Ordering = Ordering::Relaxed;

            pub const RELEASE_SUCCESS: Ordering = Ordering::Release;
            pub const RELEASE_FAIL: Ordering = Ordering::Relaxed;
        }
    }
}
