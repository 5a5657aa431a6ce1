use core::sync::atomic::{self, AtomicUsize, Ordering};

use std::sync::{Condvar, Mutex, PoisonError};

////////////////////////////////////////////////////////////////////////////////////////////////////
// WaitStrategy
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The strategy by which a blocking [`dequeue`][crate::MpmcQueue::dequeue]
/// waits for the queue to become non-empty.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum WaitStrategy {
    /// Spin with exponential backoff, then repeatedly yield the processor to
    /// other threads (lock-free).
    Yield,
    /// Park on a condition variable until a producer signals a new element.
    ///
    /// Producers have to check for parked consumers after every insertion,
    /// so this strategy is not lock-free, but it avoids burning CPU time when
    /// the queue stays empty for longer periods.
    Condvar,
}

/********** impl Default **************************************************************************/

impl Default for WaitStrategy {
    #[inline]
    fn default() -> Self {
        WaitStrategy::Yield
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Waiter
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The blocking side of a queue that waits with [`WaitStrategy::Condvar`].
///
/// The mutex guards no data, it only serializes parking consumers with the
/// notifications sent by producers.
///
/// Consumers poll the queue without holding it, since a poll may reclaim
/// records whose deleters enqueue into the very same queue.
/// Every notification that finds sleepers advances the `epoch`, and a
/// consumer only parks while the epoch it read before its last poll is
/// still current.
#[derive(Debug, Default)]
pub(crate) struct Waiter {
    lock: Mutex<()>,
    cond: Condvar,
    sleepers: AtomicUsize,
    epoch: AtomicUsize,
}

/********** impl inherent *************************************************************************/

impl Waiter {
    /// Polls until `poll` returns a value, parking the calling thread between
    /// unsuccessful attempts.
    #[inline]
    pub fn wait_for<T>(&self, mut poll: impl FnMut() -> Option<T>) -> T {
        self.sleepers.fetch_add(1, Ordering::Relaxed);

        let value = loop {
            // (WAI:1) this `Acquire` load synchronizes-with the `Release` increment (WAI:4)
            let epoch = self.epoch.load(Ordering::Acquire);
            // (WAI:2) this `SeqCst` fence synchronizes-with the `SeqCst` fence (WAI:3), so either
            // the next poll observes the producer's insertion or the producer observes the sleeper
            atomic::fence(Ordering::SeqCst);

            if let Some(value) = poll() {
                break value;
            }

            let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            let _guard = self
                .cond
                .wait_while(guard, |_| self.epoch.load(Ordering::Relaxed) == epoch)
                .unwrap_or_else(PoisonError::into_inner);
        };

        self.sleepers.fetch_sub(1, Ordering::Relaxed);
        value
    }

    /// Wakes a single parked consumer, if there is any.
    #[inline]
    pub fn notify(&self) {
        // (WAI:3) this `SeqCst` fence synchronizes-with the `SeqCst` fence (WAI:2)
        atomic::fence(Ordering::SeqCst);
        if self.sleepers.load(Ordering::Relaxed) > 0 {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            // (WAI:4) this `Release` increment synchronizes-with the `Acquire` load (WAI:1)
            self.epoch.fetch_add(1, Ordering::Release);
            self.cond.notify_one();
        }
    }
}
