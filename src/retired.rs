//! Caching for retired records until they can be safely dropped and deallocated.
//!
//! # Retired and Retired Bags
//!
//! Pointers to retired records are stored in `Retired` structs, together with
//! the type-erased function that finally reclaims them. They are stored in
//! `RetiredBag` structs and reclaimed only when no thread has an active hazard
//! pointer protecting the same memory address.
//!
//! # Abandoned Bags
//!
//! When a thread exits it attempts to reclaim all of its retired records.
//! However, it is possible that some records may not be reclaimed if other
//! threads still have active hazard pointers to these records. In this case,
//! the exiting thread's retired bag with the remaining unreclaimed records is
//! abandoned, meaning it is stored in a special global list. Other threads
//! will occasionally adopt such abandoned records, at which point it becomes
//! the adopting thread's responsibility to reclaim these records.

use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};

use crate::hazard::ProtectedPtr;
use crate::stack::{RawNode, RawStack};

/// A type-erased function that reclaims a retired record.
pub type Deleter = unsafe fn(*mut ());

////////////////////////////////////////////////////////////////////////////////////////////////////
// RetiredBag
////////////////////////////////////////////////////////////////////////////////////////////////////

/// List for caching retired records before they can be finally
/// dropped/deallocated.
///
/// This type also functions as list node for the global list of abandoned
/// bags.
#[derive(Debug)]
pub(crate) struct RetiredBag {
    pub inner: Vec<Retired>,
    next: *mut RetiredBag,
}

/********** impl inherent *************************************************************************/

impl RetiredBag {
    /// Creates a new `RetiredBag` with the given initial capacity.
    #[inline]
    pub fn new(capacity: usize) -> Self {
        Self { inner: Vec::with_capacity(capacity), next: ptr::null_mut() }
    }

    /// Returns the number of cached records.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the bag contains no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Merges `self` with the given other `Vec`, which is then dropped
    /// (deallocated).
    ///
    /// If the `other` bag has substantially higher (free) capacity than `self`,
    /// both vectors are swapped before merging. By keeping the larger vector in
    /// this case and dropping the smaller one, instead, it could be possible to
    /// avoid/defer future reallocations, when more records are retired.
    #[inline]
    pub fn merge(&mut self, mut other: Vec<Retired>) {
        if (other.capacity() - other.len()) > self.inner.capacity() {
            mem::swap(&mut self.inner, &mut other);
        }

        self.inner.append(&mut other);
    }

    /// Moves all records **not** contained in the sorted slice of `protected`
    /// pointers into `reclaimable`.
    #[inline]
    pub fn drain_unprotected(
        &mut self,
        protected: &[ProtectedPtr],
        reclaimable: &mut Vec<Retired>,
    ) {
        let mut idx = 0;
        while idx < self.inner.len() {
            let address = self.inner[idx].address();
            if protected.binary_search_by(|&protected| protected.compare_with(address)).is_ok() {
                idx += 1;
            } else {
                reclaimable.push(self.inner.swap_remove(idx));
            }
        }
    }
}

/********** impl RawNode **************************************************************************/

impl RawNode for RetiredBag {
    #[inline]
    unsafe fn next(node: *mut Self) -> *mut Self {
        (*node).next
    }

    #[inline]
    unsafe fn set_next(node: *mut Self, next: *mut Self) {
        (*node).next = next;
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Retired
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Type-erased pointer to a retired record that has not yet been reclaimed.
///
/// A `Retired` does not reclaim its record when dropped, this has to be done
/// explicitly through [`reclaim`][Retired::reclaim].
pub(crate) struct Retired {
    ptr: NonNull<()>,
    deleter: Deleter,
}

/********** impl inherent *************************************************************************/

impl Retired {
    /// Creates a new `Retired` record from a type-erased pointer and the
    /// function for reclaiming it.
    ///
    /// # Safety
    ///
    /// The caller has to ensure that `deleter` may be called with `ptr` exactly
    /// once and at an arbitrary later time, by an arbitrary thread.
    #[inline]
    pub unsafe fn new(ptr: NonNull<()>, deleter: Deleter) -> Self {
        Self { ptr, deleter }
    }

    /// Creates a new `Retired` record for a pointer that was allocated through
    /// `Box`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been created through `Box::into_raw` and must not be
    /// used mutably or dropped by anyone else.
    #[inline]
    pub unsafe fn new_boxed<T>(ptr: NonNull<T>) -> Self {
        Self::new(ptr.cast(), drop_boxed::<T>)
    }

    /// Gets the memory address of the retired record.
    #[inline]
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Reclaims the retired record by calling its deleter.
    ///
    /// # Safety
    ///
    /// The caller has to ensure no thread can still access the retired record,
    /// i.e. no hazard pointer is protecting it.
    #[inline]
    pub unsafe fn reclaim(self) {
        (self.deleter)(self.ptr.as_ptr());
    }
}

/********** impl Debug ****************************************************************************/

impl fmt::Debug for Retired {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Retired").field("address", &(self.address() as *const ())).finish()
    }
}

/********** impl Send *****************************************************************************/

// retired records are handed over between threads only through the global list of abandoned bags,
// the deleter contract requires them to be reclaimable by any thread
unsafe impl Send for Retired {}

/// Drops and de-allocates a type-erased `Box<T>`.
unsafe fn drop_boxed<T>(ptr: *mut ()) {
    mem::drop(Box::from_raw(ptr as *mut T));
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// AbandonedBags
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Concurrent list containing all retired bags abandoned by exited threads.
#[derive(Debug)]
pub(crate) struct AbandonedBags {
    raw: RawStack<RetiredBag>,
}

/********** impl inherent *************************************************************************/

impl AbandonedBags {
    /// Creates a new (empty) list.
    #[inline]
    pub const fn new() -> Self {
        Self { raw: RawStack::new() }
    }

    /// Returns `true` if there are currently no abandoned bags.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Adds a new abandoned retired bag to the front of the list.
    #[inline]
    pub fn push(&self, abandoned: Box<RetiredBag>) {
        let leaked = Box::into_raw(abandoned);
        unsafe { self.raw.push(leaked) };
    }

    /// Takes the entire content of the list and merges the retired records of
    /// all retired bags into one.
    #[inline]
    pub fn take_and_merge(&self) -> Option<Box<RetiredBag>> {
        // this avoids the swap if the list is empty
        if self.is_empty() {
            return None;
        }

        let head = self.raw.take_all();
        if head.is_null() {
            return None;
        }

        unsafe {
            let mut boxed = Box::from_raw(head);
            let mut curr = mem::replace(&mut boxed.next, ptr::null_mut());
            while !curr.is_null() {
                let RetiredBag { inner, next } = *Box::from_raw(curr);
                boxed.merge(inner);
                curr = next;
            }

            Some(boxed)
        }
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for AbandonedBags {
    #[inline(never)]
    fn drop(&mut self) {
        // when the global state is dropped, there can be no longer any active
        // threads and all remaining records can be simply reclaimed.
        let mut curr = self.raw.take_all_unsync();
        while !curr.is_null() {
            let RetiredBag { inner, next } = *unsafe { Box::from_raw(curr) };
            for retired in inner {
                unsafe { retired.reclaim() };
            }

            curr = next;
        }
    }
}
