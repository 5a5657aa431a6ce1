//! Concurrent FIFO queues and the interface they share.

mod mpmc;
mod node;
mod wait;

pub use self::mpmc::{Iter, MpmcQueue};
pub use self::wait::WaitStrategy;

/// The interface of a concurrent first-in-first-out queue that can be shared
/// among any number of producer and consumer threads.
pub trait ConcurrentQueue<T> {
    /// Returns `true` if the queue can not accept any further elements.
    fn is_full(&self) -> bool;

    /// Returns `true` if the queue appears to contain no elements.
    ///
    /// In the presence of concurrent operations the result may be outdated
    /// by the time it is returned.
    fn is_empty(&self) -> bool;

    /// Inserts `value` at the back of the queue, waiting for free capacity if
    /// necessary.
    fn enqueue(&self, value: T);

    /// Removes the element at the front of the queue, waiting until one
    /// becomes available if necessary.
    fn dequeue(&self) -> T;

    /// Attempts to insert `value` at the back of the queue without waiting and
    /// returns it back if the queue is full.
    fn try_enqueue(&self, value: T) -> Result<(), T>;

    /// Attempts to remove the element at the front of the queue without
    /// waiting and returns `None` if the queue is empty.
    fn try_dequeue(&self) -> Option<T>;
}
