//! Operations on globally shared data for hazard pointers and abandoned retired
//! records.
//!
//! There is exactly one [`Global`] instance per process, which is shared by
//! all queues and all threads.
//! It is created empty at compile time and requires no explicit
//! initialization: hazard records are allocated lazily, when a thread first
//! needs one.
//! The instance is never torn down, all hazard records remain allocated until
//! the process exits and can be re-used by any thread in the meantime.

use core::sync::atomic::{self, Ordering};

use crate::hazard::{HazardRecord, HazardRegistry, ProtectedPtr};
use crate::retired::{AbandonedBags, RetiredBag};
use crate::trace::trace;

/// The single static `Global` instance
static GLOBAL: Global = Global::new();

////////////////////////////////////////////////////////////////////////////////////////////////////
// Global
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Global data structures required for managing memory reclamation with hazard
/// pointers.
#[derive(Debug)]
pub(crate) struct Global {
    hazards: HazardRegistry,
    abandoned: AbandonedBags,
}

/********** impl inherent *************************************************************************/

impl Global {
    /// Creates a new instance of a `Global`.
    #[inline]
    const fn new() -> Self {
        Self { hazards: HazardRegistry::new(), abandoned: AbandonedBags::new() }
    }

    /// Returns the process-wide instance.
    #[inline]
    pub fn instance() -> &'static Self {
        &GLOBAL
    }

    /// Acquires a hazard record from the global registry and reserves it for
    /// the thread requesting it.
    ///
    /// This operation traverses the entire list from the head, trying to find
    /// an unused record.
    /// If it does not find one, it allocates a new one and prepends it to the
    /// list.
    #[inline]
    pub fn activated_record(&'static self) -> &'static HazardRecord {
        self.hazards.activated_record()
    }

    /// Attempts to re-capture a record that was previously released.
    #[inline]
    pub fn try_capture(&'static self, record: &'static HazardRecord) -> bool {
        self.hazards.try_capture(record)
    }

    /// Releases a record so that it can be captured by any thread.
    #[inline]
    pub fn release(&'static self, record: &'static HazardRecord) {
        self.hazards.release(record)
    }

    /// Returns the number of currently active hazard records.
    #[inline]
    pub fn active_records(&'static self) -> usize {
        self.hazards.active_count()
    }

    /// Returns the number of allocated hazard records.
    #[inline]
    pub fn allocated_records(&'static self) -> usize {
        self.hazards.allocated_count()
    }

    /// Collects all currently protected pointers into the supplied `Vec`.
    #[inline]
    pub fn collect_protected_hazards(&'static self, vec: &mut Vec<ProtectedPtr>, order: Ordering) {
        debug_assert_eq!(order, Ordering::SeqCst, "must only be called with `SeqCst`");

        // (LOC:1) this `SeqCst` fence synchronizes-with the `SeqCst` stores (HAZ:4) and the
        // `Release` stores (HAZ:2).
        // This enforces a total order between all these operations, which is required in order to
        // ensure that all stores PROTECTING pointers are fully visible BEFORE the hazard pointers
        // are scanned and unprotected retired records are reclaimed.
        atomic::fence(order);
        self.hazards.collect_protected(vec);
    }

    /// Stores an exiting thread's (non-empty) bag of retired records, which
    /// could not be reclaimed at the time the thread exited.
    #[inline]
    pub fn abandon_retired_bag(&'static self, bag: Box<RetiredBag>) {
        debug_assert!(!bag.is_empty());
        self.abandoned.push(bag);
    }

    /// Takes and merges all abandoned records and returns them as a single
    /// `RetiredBag`.
    #[inline]
    pub fn try_adopt_abandoned_records(&'static self) -> Option<Box<RetiredBag>> {
        let adopted = self.abandoned.take_and_merge();
        if adopted.is_some() {
            trace!(
                records = adopted.as_ref().map_or(0, |bag| bag.len()),
                "adopted abandoned records"
            );
        }

        adopted
    }
}
