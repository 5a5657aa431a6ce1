//! The process-wide registry of hazard records.

use core::iter::FusedIterator;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::hazard::{HazardRecord, ProtectedPtr};
use crate::sanitize;
use crate::stack::{RawNode, RawStack};
use crate::trace::trace;

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardRegistry
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An append-only linked list of re-usable [`HazardRecord`]s.
///
/// When requesting a record, the list is traversed from head to tail and the
/// first inactive record that can be captured is returned.
/// If none can be found a new record is prepended to the list's head.
/// In order to avoid having to deal with memory reclamation the list never
/// shrinks and hence maintains its maximum extent at all times.
#[derive(Debug)]
pub(crate) struct HazardRegistry {
    records: RawStack<HazardRecord>,
    /// The number of records that were ever allocated.
    allocated: AtomicUsize,
    /// The number of records currently owned by a hazard pointer.
    active: AtomicUsize,
}

/********** impl inherent *************************************************************************/

impl HazardRegistry {
    /// Creates a new empty [`HazardRegistry`].
    #[inline]
    pub const fn new() -> Self {
        Self {
            records: RawStack::new(),
            allocated: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
        }
    }

    /// Returns the (approximate) number of currently active records.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Returns the number of records that were allocated so far.
    #[inline]
    pub fn allocated_count(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Attempts to capture the given (previously released) `record`.
    #[inline]
    pub fn try_capture(&self, record: &HazardRecord) -> bool {
        if record.is_active(Ordering::Relaxed) || !record.capture() {
            return false;
        }

        self.active.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Releases an active `record`, resetting its protected pointer first.
    #[inline]
    pub fn release(&self, record: &HazardRecord) {
        debug_assert!(record.is_active(Ordering::Relaxed), "released record must be active");
        record.deactivate();
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Captures an inactive record or allocates a new one.
    ///
    /// The returned record is active and protects nothing.
    #[cold]
    #[inline(never)]
    #[must_use = "discarding an active record without releasing it renders it unusable"]
    pub fn activated_record(&self) -> &HazardRecord {
        if let Some(record) = self.iter().find(|record| self.try_capture(record)) {
            return record;
        }

        // search failed, allocate a new record, which starts out as active
        let record = Box::into_raw(Box::new(HazardRecord::new_active()));
        self.active.fetch_add(1, Ordering::Relaxed);
        self.allocated.fetch_add(1, Ordering::Relaxed);
        trace!(allocated = self.allocated_count(), "allocated new hazard record");

        // safety: the record is valid and not yet shared, after insertion it is never de-allocated
        // before the registry itself is dropped
        unsafe {
            self.records.push(record);
            &*record
        }
    }

    /// Collects all currently protected pointers into the supplied `Vec`.
    ///
    /// The caller has to issue a `SeqCst` fence before calling this method.
    #[inline]
    pub fn collect_protected(&self, vec: &mut Vec<ProtectedPtr>) {
        vec.clear();
        vec.extend(self.iter().filter_map(|record| record.protected(sanitize::RELAXED_LOAD)));
    }

    /// Returns an iterator over all records, active or not.
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter { curr: unsafe { self.records.peek().as_ref() } }
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for HazardRegistry {
    #[inline(never)]
    fn drop(&mut self) {
        let mut curr = self.records.take_all_unsync();
        while !curr.is_null() {
            unsafe {
                let next = HazardRecord::next(curr);
                drop(Box::from_raw(curr));
                curr = next;
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Iter
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Iterator over all records of a [`HazardRegistry`], from the most to the
/// least recently allocated one.
#[derive(Debug)]
pub(crate) struct Iter<'a> {
    curr: Option<&'a HazardRecord>,
}

/********** impl Iterator *************************************************************************/

impl<'a> Iterator for Iter<'a> {
    type Item = &'a HazardRecord;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let curr = self.curr.take();
        if let Some(record) = curr {
            // records are never de-allocated while the registry is alive
            self.curr = unsafe { HazardRecord::next(record as *const _ as *mut _).as_ref() };
        }

        curr
    }
}

/********** impl FusedIterator ********************************************************************/

impl FusedIterator for Iter<'_> {}

#[cfg(test)]
mod tests {
    use core::ptr::NonNull;
    use core::sync::atomic::Ordering;

    use super::HazardRegistry;

    #[test]
    fn new() {
        let registry = HazardRegistry::new();
        assert!(registry.iter().next().is_none());
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.allocated_count(), 0);
    }

    #[test]
    fn insert_one() {
        let registry = HazardRegistry::new();
        let record = registry.activated_record();
        assert_eq!(record as *const _, registry.iter().next().unwrap() as *const _);
        assert!(record.is_active(Ordering::Relaxed));
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.allocated_count(), 1);
    }

    #[test]
    fn reuse_released() {
        let registry = HazardRegistry::new();
        let first = registry.activated_record();
        let second = registry.activated_record();
        assert_eq!(registry.allocated_count(), 2);

        registry.release(first);
        assert_eq!(registry.active_count(), 1);

        let third = registry.activated_record();
        assert_eq!(third as *const _, first as *const _);
        assert_ne!(third as *const _, second as *const _);
        assert_eq!(registry.allocated_count(), 2);
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn collect_protected() {
        let registry = HazardRegistry::new();
        let mut value = 1;
        let ptr = NonNull::from(&mut value).cast::<()>();

        let protecting = registry.activated_record();
        let _idle = registry.activated_record();
        protecting.set_protected(ptr.as_ptr(), Ordering::SeqCst);

        let mut vec = Vec::new();
        registry.collect_protected(&mut vec);
        assert_eq!(vec.len(), 1);
        assert_eq!(vec[0].address(), ptr.as_ptr() as usize);

        registry.release(protecting);
        registry.collect_protected(&mut vec);
        assert!(vec.is_empty());
    }
}
