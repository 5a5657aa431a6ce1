use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rand::Rng;

use hazqueue::{ConcurrentQueue, MpmcQueue, WaitStrategy};

const PRODUCERS: usize = 10;
const CONSUMERS: usize = 10;
const PER_PRODUCER: usize = 2000;
const TOTAL: usize = PRODUCERS * PER_PRODUCER;

struct DropCount(Arc<AtomicUsize>);
impl Drop for DropCount {
    #[inline]
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

fn random_yield() {
    if rand::thread_rng().gen_ratio(1, 8) {
        thread::yield_now();
    }
}

/// Checks that every producer's values appear in increasing order.
fn assert_producer_order(received: &[(usize, usize)]) {
    let mut last = [None; PRODUCERS];
    for &(producer, seq) in received {
        if let Some(prev) = last[producer] {
            assert!(seq > prev, "producer {} out of order: {} after {}", producer, seq, prev);
        }
        last[producer] = Some(seq);
    }
}

#[test]
fn single_producer_fifo() {
    let mut queue = MpmcQueue::new();
    for i in 0..10 {
        queue.enqueue(i);
    }

    let state = format!("{:?}", queue.iter().collect::<Vec<_>>());
    assert_eq!(state, "[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]");

    let dequeued: Vec<_> = (0..10).map(|_| queue.try_dequeue().unwrap()).collect();
    assert_eq!(dequeued, (0..10).collect::<Vec<_>>());
    assert_eq!(queue.try_dequeue(), None);
    assert!(queue.is_empty());
}

#[test]
fn producers_consumers() {
    let queue = Arc::new(MpmcQueue::new());
    let consumed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(PRODUCERS + CONSUMERS));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for seq in 0..PER_PRODUCER {
                    queue.enqueue((producer, seq));
                    random_yield();
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let consumed = Arc::clone(&consumed);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut received = Vec::new();
                while consumed.load(Ordering::Relaxed) < TOTAL {
                    match queue.try_dequeue() {
                        Some(value) => {
                            consumed.fetch_add(1, Ordering::Relaxed);
                            received.push(value);
                        }
                        None => thread::yield_now(),
                    }
                }

                received
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    let mut all = HashSet::with_capacity(TOTAL);
    for consumer in consumers {
        let received = consumer.join().unwrap();
        assert_producer_order(&received);
        for value in received {
            assert!(all.insert(value), "value {:?} was dequeued twice", value);
        }
    }

    assert_eq!(all.len(), TOTAL);
    assert!(queue.is_empty());
    assert_eq!(queue.try_dequeue(), None);
}

#[test]
fn eventually_empty() {
    let queue = Arc::new(MpmcQueue::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..1000 {
                    queue.enqueue(i);
                    random_yield();
                    // every thread dequeues at most as often as it has enqueued
                    assert!(queue.try_dequeue().is_some());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(queue.len(), 0);
    assert!(queue.is_empty());
    assert_eq!(queue.try_dequeue(), None);
}

#[test]
fn no_leaks_or_double_drops() {
    let count = Arc::new(AtomicUsize::new(0));
    let queue = Arc::new(MpmcQueue::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let count = Arc::clone(&count);
            thread::spawn(move || {
                for _ in 0..500 {
                    queue.enqueue(DropCount(Arc::clone(&count)));
                    if rand::thread_rng().gen_bool(0.5) {
                        drop(queue.try_dequeue());
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let queue = Arc::try_unwrap(queue).unwrap_or_else(|_| panic!("queue still shared"));
    let remaining = queue.len();
    let dropped = count.load(Ordering::Relaxed);
    assert_eq!(dropped + remaining, 8 * 500);

    drop(queue);
    assert_eq!(count.load(Ordering::Relaxed), 8 * 500);
}

#[test]
fn blocking_dequeue() {
    for &strategy in &[WaitStrategy::Yield, WaitStrategy::Condvar] {
        let queue = Arc::new(MpmcQueue::with_wait_strategy(strategy));

        // consumers are started first, so they have to wait for the producers
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || (0..500).map(|_| queue.dequeue()).collect::<Vec<_>>())
            })
            .collect();

        let producers: Vec<_> = (0..4)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for seq in 0..500 {
                        queue.enqueue((producer, seq));
                        random_yield();
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }

        let mut all = HashSet::new();
        for consumer in consumers {
            let received = consumer.join().unwrap();
            assert_producer_order(&received);
            all.extend(received);
        }

        assert_eq!(all.len(), 2000, "strategy {:?} lost values", strategy);
        assert_eq!(queue.try_dequeue(), None);
    }
}

#[test]
fn trait_object() {
    let queue: Arc<dyn ConcurrentQueue<String> + Send + Sync> = Arc::new(MpmcQueue::new());
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0..100 {
                queue.try_enqueue(i.to_string()).unwrap();
            }
        })
    };

    let received: Vec<_> = (0..100).map(|_| queue.dequeue()).collect();
    producer.join().unwrap();

    assert_eq!(received, (0..100).map(|i| i.to_string()).collect::<Vec<_>>());
    assert!(!queue.is_full());
    assert!(queue.is_empty());
}
