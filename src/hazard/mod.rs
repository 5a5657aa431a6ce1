//! Hazard records, the globally visible slots through which threads announce
//! the pointers they are currently accessing.

mod list;

use core::cmp;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crossbeam_utils::CachePadded;

pub(crate) use self::list::HazardRegistry;

use crate::sanitize;
use crate::stack::RawNode;

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardRecord
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A slot that must be visible to all threads and indicates that the currently
/// pointed-to value is in use by some thread and therefore protected from
/// reclamation, i.e. it must not be de-allocated.
///
/// A record is owned by at most one [`HazardPointer`][crate::HazardPointer] at
/// a time, which is tracked by the `active` flag.
/// An inactive record always protects `null`.
#[derive(Debug)]
pub(crate) struct HazardRecord {
    protected: CachePadded<AtomicPtr<()>>,
    active: AtomicBool,
    next: AtomicPtr<HazardRecord>,
}

/********** impl inherent *************************************************************************/

impl HazardRecord {
    /// Creates a new record that is already active, i.e. owned by the thread
    /// that allocates it.
    #[inline]
    pub fn new_active() -> Self {
        Self {
            protected: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            active: AtomicBool::new(true),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Returns `true` if the record is currently owned by some hazard pointer.
    #[inline]
    pub fn is_active(&self, order: Ordering) -> bool {
        self.active.load(order)
    }

    /// Attempts to take ownership of an inactive record.
    #[inline]
    pub fn capture(&self) -> bool {
        // (HAZ:1) this `Acquire` CAS synchronizes-with the `Release` store (HAZ:3), so the previous
        // owner's reset of the protected pointer is visible to the new owner
        self.active.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed).is_ok()
    }

    /// Releases ownership of the record.
    ///
    /// The protected pointer is reset *before* the record is marked inactive,
    /// so any record observed as inactive protects nothing and scans never see
    /// a stale pointer of a previous owner.
    #[inline]
    pub fn deactivate(&self) {
        // (HAZ:2) this `Release` store synchronizes-with the `SeqCst` fence (LOC:1)
        self.protected.store(ptr::null_mut(), Ordering::Release);
        // (HAZ:3) this `Release` store synchronizes-with the `Acquire` CAS (HAZ:1)
        self.active.store(false, Ordering::Release);
    }

    /// Publishes `protect` as the record's protected pointer.
    ///
    /// The store is sequentially consistent, since it must be ordered before
    /// any subsequent validating load of the shared location `protect` has been
    /// read from.
    #[inline]
    pub fn set_protected(&self, protect: *mut (), order: Ordering) {
        debug_assert_eq!(order, Ordering::SeqCst, "this method requires sequential consistency");
        // (HAZ:4) this `SeqCst` store synchronizes-with the `SeqCst` fence (LOC:1)
        self.protected.store(protect, Ordering::SeqCst);
    }

    /// Resets the protected pointer while keeping ownership of the record.
    #[inline]
    pub fn set_unprotected(&self, order: Ordering) {
        self.protected.store(ptr::null_mut(), order);
    }

    /// Returns the currently protected pointer, if there is one.
    #[inline]
    pub fn protected(&self, order: Ordering) -> Option<ProtectedPtr> {
        NonNull::new(self.protected.load(order)).map(ProtectedPtr)
    }
}

/********** impl RawNode **************************************************************************/

impl RawNode for HazardRecord {
    #[inline]
    unsafe fn next(node: *mut Self) -> *mut Self {
        (*node).next.load(sanitize::RELAXED_LOAD)
    }

    #[inline]
    unsafe fn set_next(node: *mut Self, next: *mut Self) {
        (*node).next.store(next, sanitize::RELAXED_STORE);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ProtectedPtr
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An untyped pointer protected from reclamation, because it is stored within
/// a hazard record.
///
/// The type information is deliberately stripped as it is not needed in order
/// to determine whether a pointer is protected or not.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) struct ProtectedPtr(pub(crate) NonNull<()>);

/********** impl inherent *************************************************************************/

impl ProtectedPtr {
    /// Returns the memory address of the protected pointer.
    #[inline]
    pub fn address(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Compares the protected address with `address`.
    #[inline]
    pub fn compare_with(self, address: usize) -> cmp::Ordering {
        self.address().cmp(&address)
    }
}
