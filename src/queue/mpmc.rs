use core::fmt;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::pointer::HazardPointer;
use crate::queue::node::QueueNode;
use crate::queue::wait::{WaitStrategy, Waiter};
use crate::queue::ConcurrentQueue;

////////////////////////////////////////////////////////////////////////////////////////////////////
// MpmcQueue
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An unbounded lock-free multi-producer multi-consumer FIFO queue.
///
/// The queue is a singly linked chain of nodes, which always contains at least
/// one node.
/// The value of the front element is stored in the current `head` node, which
/// is only unlinked after its value has been claimed by a consumer.
/// Unlinked nodes are reclaimed through [`HazardPointer`]s, so concurrent
/// consumers can never access a de-allocated node.
///
/// # Examples
///
/// ```
/// use hazqueue::MpmcQueue;
///
/// let queue = MpmcQueue::new();
/// queue.enqueue(1);
/// queue.enqueue(2);
///
/// assert_eq!(queue.try_dequeue(), Some(1));
/// assert_eq!(queue.dequeue(), 2);
/// assert_eq!(queue.try_dequeue(), None);
/// ```
pub struct MpmcQueue<T> {
    head: CachePadded<AtomicPtr<QueueNode<T>>>,
    tail: CachePadded<AtomicPtr<QueueNode<T>>>,
    insert_version: AtomicUsize,
    remove_version: AtomicUsize,
    waiter: Option<Waiter>,
    _marker: PhantomData<T>,
}

/********** impl Send + Sync **********************************************************************/

unsafe impl<T: Send> Send for MpmcQueue<T> {}
unsafe impl<T: Send> Sync for MpmcQueue<T> {}

/********** impl inherent *************************************************************************/

impl<T> MpmcQueue<T> {
    /// Creates a new empty queue, which waits by yielding the processor.
    #[inline]
    pub fn new() -> Self {
        Self::with_wait_strategy(WaitStrategy::default())
    }

    /// Creates a new empty queue with the given `strategy` for blocking
    /// dequeue operations.
    #[inline]
    pub fn with_wait_strategy(strategy: WaitStrategy) -> Self {
        let sentinel = Box::into_raw(Box::new(QueueNode::sentinel()));
        Self {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            insert_version: AtomicUsize::new(0),
            remove_version: AtomicUsize::new(0),
            waiter: match strategy {
                WaitStrategy::Yield => None,
                WaitStrategy::Condvar => Some(Waiter::default()),
            },
            _marker: PhantomData,
        }
    }

    /// Returns the strategy by which blocking dequeue operations wait.
    #[inline]
    pub fn wait_strategy(&self) -> WaitStrategy {
        match self.waiter {
            Some(_) => WaitStrategy::Condvar,
            None => WaitStrategy::Yield,
        }
    }

    /// Returns `true` if all operations on the queue are lock-free.
    #[inline]
    pub fn is_lock_free(&self) -> bool {
        self.waiter.is_none()
    }

    /// Returns `true` if the queue appears to be empty.
    ///
    /// The result is only a hint, it is derived from two independently updated
    /// counters and may not reflect concurrent operations.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Always returns `false`, since the queue is unbounded.
    #[inline]
    pub fn is_full(&self) -> bool {
        false
    }

    /// Returns the approximate number of elements in the queue.
    ///
    /// The result is exact if no other thread accesses the queue concurrently.
    #[inline]
    pub fn len(&self) -> usize {
        let removed = self.remove_version.load(Ordering::Relaxed);
        let inserted = self.insert_version.load(Ordering::Relaxed);
        inserted.saturating_sub(removed)
    }

    /// Inserts `value` at the back of the queue.
    #[inline]
    pub fn enqueue(&self, value: T) {
        // the node is allocated before any shared state is touched
        let node = Box::into_raw(Box::new(QueueNode::new(value)));

        let mut hazard = HazardPointer::new();
        let mut tail = hazard.acquire_atomic(&*self.tail);
        loop {
            debug_assert!(!tail.is_null(), "the queue always contains at least one node");
            // the tail is protected and nodes are only retired after the tail has moved past them
            let tail_ref = unsafe { &*tail };

            // (QUE:1) this `Release` CAS synchronizes-with the `Acquire` loads and CAS failures
            // (QUE:2), (QUE:4) and (QUE:5) that observe the new node
            match tail_ref.next.compare_exchange(
                ptr::null_mut(),
                node,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    // this may fail if another thread has already helped advancing the tail
                    self.advance_tail(tail, node);
                    break;
                }
                Err(next) => {
                    // (QUE:2) the tail lags behind, help advancing it before retrying
                    self.advance_tail(tail, next);
                    tail = hazard.acquire_atomic(&*self.tail);
                }
            }
        }

        drop(hazard);
        self.insert_version.fetch_add(1, Ordering::Relaxed);
        if let Some(waiter) = &self.waiter {
            waiter.notify();
        }
    }

    /// Attempts to remove the element at the front of the queue and returns
    /// `None` if the queue is empty.
    #[inline]
    pub fn try_dequeue(&self) -> Option<T> {
        let mut hazard = HazardPointer::new();
        loop {
            let head = hazard.acquire_atomic(&*self.head);
            debug_assert!(!head.is_null(), "the queue always contains at least one node");
            // the head is protected and nodes are only retired after being unlinked from the head
            let head_ref = unsafe { &*head };
            // (QUE:3) this `Acquire` load synchronizes-with the `Release` CAS (QUE:6)
            let tail = self.tail.load(Ordering::Acquire);

            if head == tail {
                // a single node is left, so its value is claimed without unlinking the node
                if head_ref.value.invalidate() {
                    return Some(self.take_claimed(head_ref));
                }

                // (QUE:4) this `Acquire` load synchronizes-with the `Release` CAS (QUE:1)
                let next = head_ref.next.load(Ordering::Acquire);
                if next.is_null() {
                    return None;
                }

                // the tail lags behind, help advancing it before retrying
                self.advance_tail(tail, next);
                continue;
            }

            // (QUE:5) this `Acquire` load synchronizes-with the `Release` CAS (QUE:1)
            let next = head_ref.next.load(Ordering::Acquire);
            if next.is_null() {
                continue;
            }

            if self
                .head
                .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                // the unlinked node remains protected until the hazard pointer is dropped
                unsafe { HazardPointer::schedule_deletion(head) };
                if head_ref.value.invalidate() {
                    return Some(self.take_claimed(head_ref));
                }
            }
        }
    }

    /// Removes the element at the front of the queue and waits until one
    /// becomes available, if the queue is empty.
    #[inline]
    pub fn dequeue(&self) -> T {
        if let Some(waiter) = &self.waiter {
            return waiter.wait_for(|| self.try_dequeue());
        }

        let backoff = Backoff::new();
        loop {
            if let Some(value) = self.try_dequeue() {
                return value;
            }

            backoff.snooze();
        }
    }

    /// Inserts `value` at the back of the queue, which never fails for an
    /// unbounded queue.
    #[inline]
    pub fn try_enqueue(&self, value: T) -> Result<(), T> {
        self.enqueue(value);
        Ok(())
    }

    /// Returns an iterator over all elements in the queue from front to back.
    #[inline]
    pub fn iter(&mut self) -> Iter<'_, T> {
        Iter { curr: *self.head.get_mut(), _marker: PhantomData }
    }

    #[inline]
    fn advance_tail(&self, current: *mut QueueNode<T>, next: *mut QueueNode<T>) {
        // (QUE:6) this `Release` CAS synchronizes-with the `Acquire` loads (QUE:3) and (PTR:1)
        let _ = self.tail.compare_exchange(current, next, Ordering::Release, Ordering::Relaxed);
    }

    #[inline]
    fn take_claimed(&self, node: &QueueNode<T>) -> T {
        self.remove_version.fetch_add(1, Ordering::Relaxed);
        // the calling thread has won the slot's invalidation
        unsafe { node.value.take() }
    }
}

/********** impl ConcurrentQueue ******************************************************************/

impl<T> ConcurrentQueue<T> for MpmcQueue<T> {
    #[inline]
    fn is_full(&self) -> bool {
        MpmcQueue::is_full(self)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        MpmcQueue::is_empty(self)
    }

    #[inline]
    fn enqueue(&self, value: T) {
        MpmcQueue::enqueue(self, value)
    }

    #[inline]
    fn dequeue(&self) -> T {
        MpmcQueue::dequeue(self)
    }

    #[inline]
    fn try_enqueue(&self, value: T) -> Result<(), T> {
        MpmcQueue::try_enqueue(self, value)
    }

    #[inline]
    fn try_dequeue(&self) -> Option<T> {
        MpmcQueue::try_dequeue(self)
    }
}

/********** impl Default **************************************************************************/

impl<T> Default for MpmcQueue<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl<T> fmt::Debug for MpmcQueue<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MpmcQueue")
            .field("len", &self.len())
            .field("wait_strategy", &self.wait_strategy())
            .finish()
    }
}

/********** impl Drop *****************************************************************************/

impl<T> Drop for MpmcQueue<T> {
    #[inline]
    fn drop(&mut self) {
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            // all nodes still in the chain are exclusively owned by the queue, unlinked nodes have
            // already been retired and are reclaimed separately
            let mut node = unsafe { Box::from_raw(curr) };
            curr = *node.next.get_mut();
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Iter
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An iterator over the elements of an exclusively borrowed [`MpmcQueue`].
#[derive(Debug)]
pub struct Iter<'a, T> {
    curr: *mut QueueNode<T>,
    _marker: PhantomData<&'a MpmcQueue<T>>,
}

/********** impl Iterator *************************************************************************/

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        while !self.curr.is_null() {
            // the queue is exclusively borrowed for 'a, so no node can be unlinked or claimed
            let node = unsafe { &mut *self.curr };
            self.curr = *node.next.get_mut();
            if let Some(value) = node.value.get_mut() {
                return Some(&*value);
            }
        }

        None
    }
}

/********** impl FusedIterator ********************************************************************/

impl<T> FusedIterator for Iter<'_, T> {}
