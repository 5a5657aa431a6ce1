use core::fmt;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::hazard::HazardRecord;
use crate::local;
use crate::retired::{Deleter, Retired};

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardPointer
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An owned hazard record through which a single pointer at a time can be
/// protected from reclamation.
///
/// A `HazardPointer` does not synchronize access to the pointed-to value, it
/// only guarantees that a pointer it protects is not reclaimed through
/// [`schedule_deletion`][HazardPointer::schedule_deletion] for as long as it
/// remains protected.
///
/// Dropping the `HazardPointer` releases the protection and its record.
pub struct HazardPointer<T> {
    record: &'static HazardRecord,
    /// The local (non-atomic) copy of the last published pointer.
    ptr: *mut T,
    _marker: PhantomData<*mut T>,
}

/********** impl inherent *************************************************************************/

impl<T> HazardPointer<T> {
    /// Creates a new hazard pointer, which initially protects nothing.
    #[inline]
    pub fn new() -> Self {
        Self { record: local::acquire_record(), ptr: ptr::null_mut(), _marker: PhantomData }
    }

    /// Publishes `ptr` as protected.
    ///
    /// This does *not* guarantee that `ptr` is still valid after the call, as
    /// it may have been reclaimed before the protection became visible.
    /// The caller has to verify by other means (e.g. by re-reading the location
    /// it loaded `ptr` from) that `ptr` has not been retired in the meantime.
    /// Once verified, `ptr` remains valid for as long as it is protected.
    #[inline]
    pub fn acquire(&mut self, ptr: *mut T) {
        self.record.set_protected(ptr as *mut (), Ordering::SeqCst);
        self.ptr = ptr;
    }

    /// Loads the pointer stored in `atomic` and protects it.
    ///
    /// The pointer is loaded, published and re-loaded until two consecutive
    /// loads agree, so the returned pointer is guaranteed to have been reachable
    /// through `atomic` *after* the protection was published.
    /// Any pointer that is only ever retired after being unlinked from `atomic`
    /// is therefore safe to dereference for as long as it remains protected.
    #[inline]
    pub fn acquire_atomic(&mut self, atomic: &AtomicPtr<T>) -> *mut T {
        let mut ptr = atomic.load(Ordering::Relaxed);
        loop {
            self.acquire(ptr);
            // (PTR:1) this `Acquire` load synchronizes-with the `Release` stores or CAS operations
            // that published the pointed-to value
            let reload = atomic.load(Ordering::Acquire);
            if reload == ptr {
                return ptr;
            }

            ptr = reload;
        }
    }

    /// Returns the currently protected pointer (which may be null).
    #[inline]
    pub fn get(&self) -> *mut T {
        self.ptr
    }

    /// Returns `true` if the hazard pointer currently protects nothing.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Dereferences the currently protected pointer.
    ///
    /// # Safety
    ///
    /// The protected pointer must have been validated (see
    /// [`acquire`][HazardPointer::acquire]) and must point to a live value.
    #[inline]
    pub unsafe fn as_ref(&self) -> Option<&T> {
        self.ptr.as_ref()
    }

    /// Resets the hazard pointer, so it no longer protects any pointer but
    /// retains its record.
    #[inline]
    pub fn reset(&mut self) {
        // (PTR:2) this `Release` store ensures all prior accesses to the previously protected value
        // happen-before its eventual reclamation
        self.record.set_unprotected(Ordering::Release);
        self.ptr = ptr::null_mut();
    }

    /// Schedules `ptr` for deletion once no hazard pointer protects it anymore.
    ///
    /// `ptr` may still be used after this call for as long as it remains
    /// protected by some hazard pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null and must have been created through
    /// [`Box::into_raw`].
    /// It must be scheduled for deletion exactly once, which is usually ensured
    /// by only ever deleting pointers that the calling thread atomically
    /// unlinked from a shared data structure.
    /// After unlinking, no thread must be able to newly acquire and protect
    /// `ptr`.
    /// The record is dropped at an unspecified time by an unspecified thread,
    /// so its `Drop` implementation must not access any non-static references
    /// that may have expired by then.
    #[inline]
    pub unsafe fn schedule_deletion(ptr: *mut T) {
        debug_assert!(!ptr.is_null(), "scheduled deletion of a null pointer");
        local::retire_record(Retired::new_boxed(NonNull::new_unchecked(ptr)));
    }
}

/********** impl Default **************************************************************************/

impl<T> Default for HazardPointer<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl<T> fmt::Debug for HazardPointer<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HazardPointer").field("ptr", &self.ptr).finish()
    }
}

/********** impl Drop *****************************************************************************/

impl<T> Drop for HazardPointer<T> {
    #[inline]
    fn drop(&mut self) {
        local::release_record(self.record);
    }
}

/********** impl Send *****************************************************************************/

// the protection is not bound to the creating thread, the record is simply released by the thread
// that drops the hazard pointer
unsafe impl<T: Send> Send for HazardPointer<T> {}

////////////////////////////////////////////////////////////////////////////////////////////////////
// free functions
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Schedules the type-erased `ptr` for reclamation through `deleter`, once no
/// hazard pointer protects it anymore.
///
/// # Safety
///
/// `deleter` must be safe to call with `ptr` exactly once, at an arbitrary
/// later time and from an arbitrary thread.
/// The same requirements for unlinking as with
/// [`HazardPointer::schedule_deletion`] apply.
#[inline]
pub unsafe fn schedule_deletion_with(ptr: NonNull<()>, deleter: Deleter) {
    local::retire_record(Retired::new(ptr, deleter));
}

/// Adopts all records abandoned by exited threads and attempts to reclaim all
/// records retired by the calling thread.
///
/// Records that are still protected remain cached.
#[inline]
pub fn flush() {
    local::flush();
}

/// Returns the number of records retired by the calling thread that are not
/// yet reclaimed.
#[inline]
pub fn retired_count() -> usize {
    local::retired_count()
}

/// Returns the number of hazard pointers that are currently alive across all
/// threads.
#[inline]
pub fn active_records() -> usize {
    crate::global::Global::instance().active_records()
}

/// Returns the number of hazard records that have been allocated so far.
///
/// Records are never de-allocated, so this is also the maximum number of
/// hazard pointers that were alive at the same time.
#[inline]
pub fn allocated_records() -> usize {
    crate::global::Global::instance().allocated_records()
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
    use std::thread;

    use super::{flush, retired_count, schedule_deletion_with, HazardPointer};

    static DELETED: AtomicUsize = AtomicUsize::new(0);

    unsafe fn delete_and_count(ptr: *mut ()) {
        drop(Box::from_raw(ptr.cast::<u64>()));
        DELETED.fetch_add(1, Ordering::Relaxed);
    }

    struct DropCount<'a>(&'a AtomicUsize);
    impl Drop for DropCount<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn new_is_null() {
        let hazard: HazardPointer<i32> = HazardPointer::new();
        assert!(hazard.is_null());
        assert!(hazard.get().is_null());
        assert!(unsafe { hazard.as_ref() }.is_none());
    }

    #[test]
    fn acquire_and_reset() {
        let value = Box::into_raw(Box::new(7));
        let mut hazard = HazardPointer::new();

        hazard.acquire(value);
        assert_eq!(hazard.get(), value);
        assert_eq!(unsafe { hazard.as_ref() }, Some(&7));

        hazard.reset();
        assert!(hazard.is_null());
        unsafe { drop(Box::from_raw(value)) };
    }

    #[test]
    fn acquire_atomic() {
        let first = Box::into_raw(Box::new(1));
        let atomic = AtomicPtr::new(first);

        let mut hazard = HazardPointer::new();
        assert_eq!(hazard.acquire_atomic(&atomic), first);
        assert_eq!(hazard.get(), first);

        let second = Box::into_raw(Box::new(2));
        atomic.store(second, Ordering::Relaxed);
        assert_eq!(hazard.acquire_atomic(&atomic), second);
        assert_eq!(unsafe { hazard.as_ref() }, Some(&2));

        unsafe {
            drop(Box::from_raw(first));
            drop(Box::from_raw(second));
        }
    }

    #[test]
    fn custom_deleter() {
        thread::spawn(|| {
            let ptrs: Vec<_> = (0..10).map(|i| Box::into_raw(Box::new(i as u64))).collect();
            let mut hazard = HazardPointer::new();
            hazard.acquire(ptrs[0]);

            for &ptr in &ptrs {
                let ptr = NonNull::new(ptr.cast::<()>()).unwrap();
                unsafe { schedule_deletion_with(ptr, delete_and_count) };
            }

            flush();
            assert_eq!(DELETED.load(Ordering::Relaxed), 9);
            assert_eq!(retired_count(), 1);
            assert_eq!(unsafe { hazard.as_ref() }, Some(&0));

            hazard.reset();
            flush();
            assert_eq!(DELETED.load(Ordering::Relaxed), 10);
            assert_eq!(retired_count(), 0);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn protected_survives_deletion() {
        // run on a fresh thread so the reclamation state is not shared with other tests
        thread::spawn(|| {
            let count = AtomicUsize::new(0);
            let ptrs: Vec<_> =
                (0..100).map(|_| Box::into_raw(Box::new(DropCount(&count)))).collect();

            let mut hazards: Vec<HazardPointer<DropCount>> = ptrs
                .iter()
                .map(|&ptr| {
                    let mut hazard = HazardPointer::new();
                    hazard.acquire(ptr);
                    hazard
                })
                .collect();

            for &ptr in &ptrs {
                unsafe { HazardPointer::schedule_deletion(ptr) };
            }

            flush();
            assert_eq!(count.load(Ordering::Relaxed), 0, "no protected record must be reclaimed");

            for hazard in &mut hazards[..50] {
                hazard.reset();
            }

            flush();
            assert_eq!(count.load(Ordering::Relaxed), 50);
            assert!(hazards[50..].iter().all(|hazard| unsafe { hazard.as_ref() }.is_some()));

            // dropping the remaining hazard pointers releases their protection
            drop(hazards);
            flush();
            assert_eq!(count.load(Ordering::Relaxed), 100);
        })
        .join()
        .unwrap();
    }
}
