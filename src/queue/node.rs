use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

////////////////////////////////////////////////////////////////////////////////////////////////////
// QueueNode
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A node of the singly linked chain that makes up a queue.
#[derive(Debug)]
pub(crate) struct QueueNode<T> {
    pub next: AtomicPtr<QueueNode<T>>,
    pub value: ValueSlot<T>,
}

/********** impl inherent *************************************************************************/

impl<T> QueueNode<T> {
    /// Creates a new unlinked node holding `value`.
    #[inline]
    pub fn new(value: T) -> Self {
        Self { next: AtomicPtr::new(ptr::null_mut()), value: ValueSlot::new(value) }
    }

    /// Creates a new unlinked node without a value.
    #[inline]
    pub fn sentinel() -> Self {
        Self { next: AtomicPtr::new(ptr::null_mut()), value: ValueSlot::empty() }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ValueSlot
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A slot that may or may not hold a value and that can be atomically
/// invalidated (i.e. claimed) by exactly one thread.
///
/// The slot itself provides no memory barriers for the initialization of the
/// value, the value must be published by whatever mechanism shares the slot
/// with other threads.
pub(crate) struct ValueSlot<T> {
    valid: AtomicBool,
    value: UnsafeCell<MaybeUninit<T>>,
}

/********** impl inherent *************************************************************************/

impl<T> ValueSlot<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        Self { valid: AtomicBool::new(true), value: UnsafeCell::new(MaybeUninit::new(value)) }
    }

    #[inline]
    pub fn empty() -> Self {
        Self { valid: AtomicBool::new(false), value: UnsafeCell::new(MaybeUninit::uninit()) }
    }

    /// Returns `true` if the slot holds a value that has not yet been claimed.
    #[inline]
    pub fn is_valid(&self, order: Ordering) -> bool {
        self.valid.load(order)
    }

    /// Attempts to claim the slot's value and returns `true` if the calling
    /// thread has succeeded.
    ///
    /// Returns `false` if the slot was already claimed by another thread or if
    /// it never held a value.
    #[inline]
    pub fn invalidate(&self) -> bool {
        // fast path avoids the CAS for sentinels and claimed slots
        self.valid.load(Ordering::Relaxed)
            && self
                .valid
                .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    /// Moves the value out of the slot.
    ///
    /// # Safety
    ///
    /// The caller must have successfully claimed the slot through
    /// [`invalidate`][ValueSlot::invalidate] and must call this exactly once.
    #[inline]
    pub unsafe fn take(&self) -> T {
        ptr::read(self.value.get()).assume_init()
    }

    /// Returns a reference to the value, if it is valid.
    ///
    /// Requires exclusive access so no other thread can claim the value
    /// concurrently.
    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if *self.valid.get_mut() {
            Some(unsafe { &mut *(*self.value.get()).as_mut_ptr() })
        } else {
            None
        }
    }
}

/********** impl Debug ****************************************************************************/

impl<T> core::fmt::Debug for ValueSlot<T> {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("ValueSlot").field("valid", &self.is_valid(Ordering::Relaxed)).finish()
    }
}

/********** impl Drop *****************************************************************************/

impl<T> Drop for ValueSlot<T> {
    #[inline]
    fn drop(&mut self) {
        if *self.valid.get_mut() {
            unsafe { ptr::drop_in_place((*self.value.get()).as_mut_ptr()) };
        }
    }
}
