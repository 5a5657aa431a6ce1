//! A simple lock-free stack that uses *compare-and-swap* to insert elements at
//! the head and *swap* (exchange) to consume all elements at once.
//!
//! The raw implementation is deliberately bare-bones as it is used in two
//! different places for different purposes: the append-only registry of hazard
//! records (which is never consumed) and the global list of abandoned retired
//! bags (which is always consumed at once).
//! Neither requires any dedicated memory reclamation mechanism.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::sanitize;

////////////////////////////////////////////////////////////////////////////////////////////////////
// RawNode (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A trait for node types that contain `next` pointers and can be accessed
/// through raw pointers.
pub(crate) trait RawNode {
    /// Returns the `node`'s next pointer.
    ///
    /// # Safety
    ///
    /// The caller has to ensure `node` is a valid pointer to a node.
    unsafe fn next(node: *mut Self) -> *mut Self;

    /// Sets the `node`'s next pointer to `next`.
    ///
    /// # Safety
    ///
    /// The caller has to ensure `node` is a valid pointer to a node that is not
    /// yet reachable by other threads.
    unsafe fn set_next(node: *mut Self, next: *mut Self);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RawStack
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A concurrent linked-list based stack operating on raw pointers that serves
/// as a building block for more specialized data structures.
#[derive(Debug)]
pub(crate) struct RawStack<N> {
    head: AtomicPtr<N>,
}

/********** impl inherent *************************************************************************/

impl<N> RawStack<N> {
    /// Creates a new empty `RawStack`.
    #[inline]
    pub const fn new() -> Self {
        Self { head: AtomicPtr::new(ptr::null_mut()) }
    }
}

impl<N: RawNode> RawStack<N> {
    /// Returns `true` if the stack is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed).is_null()
    }

    /// Returns the current head node without removing it.
    ///
    /// All nodes reachable from the returned node are fully initialized.
    #[inline]
    pub fn peek(&self) -> *mut N {
        // (STK:1) this `Acquire` load synchronizes-with the `Release` CAS (STK:3)
        self.head.load(Ordering::Acquire)
    }

    /// Pushes `node` to the head of the stack.
    ///
    /// # Safety
    ///
    /// `node` must be non-null and valid (alive and not mutably aliased).
    #[inline]
    pub unsafe fn push(&self, node: *mut N) {
        loop {
            let head = self.head.load(Ordering::Relaxed);
            N::set_next(node, head);

            if self.cas_head(head, node) {
                return;
            }
        }
    }

    /// Swaps out the first node and leaves the `RawStack` empty.
    ///
    /// The returned node (if it is non-`null`) effectively owns all following
    /// nodes and can deallocate or mutate them as desired.
    #[inline]
    pub fn take_all(&self) -> *mut N {
        // (STK:2) this `Acquire` swap synchronizes-with the `Release` CAS (STK:3)
        self.head.swap(ptr::null_mut(), Ordering::Acquire)
    }

    /// Same as take all, but without synchronization or ordering constraints.
    /// Requires exclusive access through the `&mut self` receiver.
    #[inline]
    pub fn take_all_unsync(&mut self) -> *mut N {
        self.head.swap(ptr::null_mut(), Ordering::Relaxed)
    }

    #[inline]
    unsafe fn cas_head(&self, current: *mut N, new: *mut N) -> bool {
        // (STK:3) this `Release` CAS publishes the initialized node and its
        // `next` pointer
        self.head
            .compare_exchange_weak(current, new, sanitize::RELEASE_SUCCESS, sanitize::RELEASE_FAIL)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::{RawNode, RawStack};

    struct Node {
        value: i32,
        next: *mut Node,
    }

    impl RawNode for Node {
        unsafe fn next(node: *mut Self) -> *mut Self {
            (*node).next
        }

        unsafe fn set_next(node: *mut Self, next: *mut Self) {
            (*node).next = next;
        }
    }

    fn node(value: i32) -> *mut Node {
        Box::into_raw(Box::new(Node { value, next: ptr::null_mut() }))
    }

    #[test]
    fn push_and_take_all() {
        let stack = RawStack::new();
        assert!(stack.is_empty());

        unsafe {
            stack.push(node(1));
            stack.push(node(2));
            stack.push(node(3));
        }

        assert!(!stack.is_empty());
        assert_eq!(unsafe { (*stack.peek()).value }, 3);

        let mut values = Vec::new();
        let mut curr = stack.take_all();
        while !curr.is_null() {
            let boxed = unsafe { Box::from_raw(curr) };
            values.push(boxed.value);
            curr = boxed.next;
        }

        assert_eq!(values, [3, 2, 1]);
        assert!(stack.is_empty());
    }
}
