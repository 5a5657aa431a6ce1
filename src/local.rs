//! Thread local state and caches for reserving hazard records and storing
//! retired records.
//!
//! Each thread lazily creates its own [`Local`] context the first time it
//! acquires a hazard pointer or retires a record.
//! The context is destroyed when the thread exits, at which point a final scan
//! is performed and all records that could not yet be reclaimed are abandoned
//! to the global list, from where other threads will eventually adopt them.

use core::cell::RefCell;
use core::mem::{self, ManuallyDrop};
use core::ptr;
use core::sync::atomic::Ordering;

use arrayvec::ArrayVec;

use crate::config::Config;
use crate::global::Global;
use crate::hazard::{HazardRecord, ProtectedPtr};
use crate::retired::{Retired, RetiredBag};
use crate::trace::{debug, trace};

////////////////////////////////////////////////////////////////////////////////////////////////////
// constants
////////////////////////////////////////////////////////////////////////////////////////////////////

const RECORD_CACHE: usize = 16;
const SCAN_CACHE: usize = 64;

thread_local!(static LOCAL: Local = Local::new());

////////////////////////////////////////////////////////////////////////////////////////////////////
// thread context access
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Returns an active hazard record for the calling thread, preferring records
/// previously released by the same thread.
#[inline]
pub(crate) fn acquire_record() -> &'static HazardRecord {
    LOCAL
        .try_with(Local::take_cached_record)
        .ok()
        .flatten()
        .unwrap_or_else(|| Global::instance().activated_record())
}

/// Releases an active hazard record and remembers it in the thread local cache
/// as candidate for the next acquisition.
#[inline]
pub(crate) fn release_record(record: &'static HazardRecord) {
    Global::instance().release(record);
    // the thread local state may already be destroyed, in which case the record is simply left for
    // any thread to capture
    let _ = LOCAL.try_with(|local| local.cache_record(record));
}

/// Retires a record, which is reclaimed once no hazard pointer protects it
/// anymore.
///
/// # Safety
///
/// The record must be unreachable for all threads that do not already hold a
/// protected reference to it, and it must not be retired twice.
#[inline]
pub(crate) unsafe fn retire_record(retired: Retired) {
    let mut retired = Some(retired);
    let reclaimable = LOCAL
        .try_with(|local| retired.take().map(|retired| local.retire(retired)))
        .ok()
        .flatten();

    match reclaimable {
        Some(reclaimable) => reclaim_all(reclaimable),
        None => {
            // the thread local state is not accessible (anymore), so the record is handed over to
            // the global list of abandoned records
            if let Some(retired) = retired.take() {
                let mut bag = Box::new(RetiredBag::new(1));
                bag.inner.push(retired);
                Global::instance().abandon_retired_bag(bag);
            }
        }
    }
}

/// Adopts all abandoned records and reclaims all records retired by the
/// calling thread, which are not currently protected.
#[inline]
pub(crate) fn flush() {
    if let Ok(reclaimable) = LOCAL.try_with(Local::flush) {
        unsafe { reclaim_all(reclaimable) };
    }
}

/// Returns the number of records retired by the calling thread that have not
/// yet been reclaimed.
#[inline]
pub(crate) fn retired_count() -> usize {
    LOCAL.try_with(Local::retired_count).unwrap_or(0)
}

#[inline]
unsafe fn reclaim_all(reclaimable: Vec<Retired>) {
    for retired in reclaimable {
        retired.reclaim();
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Local
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Container for all thread local data required for reclamation with hazard
/// pointers.
///
/// Retired records are never reclaimed while the inner state is borrowed, so
/// the destructors of reclaimed records are free to retire further records or
/// to acquire hazard pointers.
#[derive(Debug)]
pub(crate) struct Local {
    inner: RefCell<LocalInner>,
}

/********** impl inherent *************************************************************************/

impl Local {
    /// Creates a new container for the thread local state.
    #[inline]
    fn new() -> Self {
        let config = Config::current();
        debug!(?config, "creating thread local reclamation state");
        Self { inner: RefCell::new(LocalInner::new(config)) }
    }

    #[inline]
    fn take_cached_record(&self) -> Option<&'static HazardRecord> {
        let mut inner = self.inner.try_borrow_mut().ok()?;
        while let Some(record) = inner.record_cache.pop() {
            // cached records are inactive and may have been captured by other threads since
            if Global::instance().try_capture(record) {
                return Some(record);
            }
        }

        None
    }

    #[inline]
    fn cache_record(&self, record: &'static HazardRecord) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            // the cache is only a hint, so a full cache is not an error
            let _ = inner.record_cache.try_push(record);
        }
    }

    #[inline]
    fn retire(&self, retired: Retired) -> Vec<Retired> {
        match self.inner.try_borrow_mut() {
            Ok(mut inner) => inner.retire(retired),
            Err(_) => {
                let mut bag = Box::new(RetiredBag::new(1));
                bag.inner.push(retired);
                Global::instance().abandon_retired_bag(bag);
                Vec::new()
            }
        }
    }

    #[inline]
    fn flush(&self) -> Vec<Retired> {
        match self.inner.try_borrow_mut() {
            Ok(mut inner) => inner.try_flush(),
            Err(_) => Vec::new(),
        }
    }

    #[inline]
    fn retired_count(&self) -> usize {
        self.inner.try_borrow().map(|inner| inner.retired_bag.len()).unwrap_or(0)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// LocalInner
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
struct LocalInner {
    /// The copy of the global configuration that is read once during
    /// a thread's creation
    config: Config,
    /// The thread local cache for recently released hazard records
    record_cache: ArrayVec<&'static HazardRecord, RECORD_CACHE>,
    /// The cache for storing currently protected records during scan attempts
    scan_cache: Vec<ProtectedPtr>,
    /// The cache for storing retired records
    retired_bag: ManuallyDrop<Box<RetiredBag>>,
}

/********** impl inherent *************************************************************************/

impl LocalInner {
    #[inline]
    fn new(config: Config) -> Self {
        let retired_bag = match Global::instance().try_adopt_abandoned_records() {
            Some(boxed) => boxed,
            None => Box::new(RetiredBag::new(config.init_cache())),
        };

        Self {
            config,
            record_cache: ArrayVec::new(),
            scan_cache: Vec::with_capacity(SCAN_CACHE),
            retired_bag: ManuallyDrop::new(retired_bag),
        }
    }

    /// Stores the retired record and returns all records that can be reclaimed,
    /// if the scan threshold has been exceeded.
    #[inline]
    fn retire(&mut self, retired: Retired) -> Vec<Retired> {
        self.retired_bag.inner.push(retired);
        self.adopt_abandoned();

        let active = Global::instance().active_records();
        if self.config.is_scan_due(self.retired_bag.len(), active) {
            self.scan_hazards()
        } else {
            Vec::new()
        }
    }

    /// Adopts all abandoned records and returns all records that can be
    /// reclaimed.
    #[cold]
    fn try_flush(&mut self) -> Vec<Retired> {
        self.adopt_abandoned();
        if self.retired_bag.is_empty() {
            return Vec::new();
        }

        self.scan_hazards()
    }

    #[inline]
    fn adopt_abandoned(&mut self) {
        if let Some(mut abandoned) = Global::instance().try_adopt_abandoned_records() {
            self.retired_bag.merge(mem::take(&mut abandoned.inner));
        }
    }

    /// Collects all protected pointers and separates the unprotected retired
    /// records, which are returned.
    #[inline]
    fn scan_hazards(&mut self) -> Vec<Retired> {
        Global::instance().collect_protected_hazards(&mut self.scan_cache, Ordering::SeqCst);
        self.scan_cache.sort_unstable();

        let mut reclaimable = Vec::new();
        self.retired_bag.drain_unprotected(&self.scan_cache, &mut reclaimable);
        trace!(
            protected = self.scan_cache.len(),
            reclaimed = reclaimable.len(),
            remaining = self.retired_bag.len(),
            "scanned hazard pointers"
        );

        reclaimable
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for LocalInner {
    #[cold]
    fn drop(&mut self) {
        // execute a final reclamation attempt, records retired by the reclaimed records'
        // destructors are abandoned right away, since the thread local state is no longer
        // accessible
        let reclaimable = self.try_flush();
        unsafe { reclaim_all(reclaimable) };

        // this is safe because the field is neither accessed afterwards nor dropped
        let bag = unsafe { ptr::read(&*self.retired_bag) };
        if !bag.is_empty() {
            debug!(records = bag.len(), "abandoning unreclaimed records on thread exit");
            Global::instance().abandon_retired_bag(bag);
        }
    }
}
