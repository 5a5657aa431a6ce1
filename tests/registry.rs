//! The hazard record counts are process wide, so this binary contains a
//! single test that has them to itself.

use std::thread;

use hazqueue::{active_records, allocated_records, HazardPointer, MpmcQueue};

#[test]
fn records_shared_across_queues() {
    thread::spawn(|| {
        assert_eq!(active_records(), 0);
        assert_eq!(allocated_records(), 0);

        let first: HazardPointer<i32> = HazardPointer::new();
        let second: HazardPointer<i32> = HazardPointer::new();
        assert_eq!(active_records(), 2);
        assert_eq!(allocated_records(), 2);

        drop(first);
        assert_eq!(active_records(), 1);
        assert_eq!(allocated_records(), 2);

        let queues: Vec<MpmcQueue<usize>> = (0..4).map(|_| MpmcQueue::new()).collect();
        for i in 0..1000 {
            for queue in &queues {
                queue.enqueue(i);
            }

            for queue in &queues {
                assert_eq!(queue.try_dequeue(), Some(i));
            }
        }

        // every operation on any queue reuses the single released record
        assert_eq!(active_records(), 1);
        assert_eq!(allocated_records(), 2);

        drop(second);
        assert_eq!(active_records(), 0);
    })
    .join()
    .unwrap();

    // records released by exited threads are captured again
    let workers: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(|| {
                let queues: Vec<MpmcQueue<usize>> = (0..4).map(|_| MpmcQueue::new()).collect();
                for i in 0..1000 {
                    queues[i % 4].enqueue(i);
                    assert_eq!(queues[i % 4].try_dequeue(), Some(i));
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(active_records(), 0);
    // at most four records are active at any time, a few more may be allocated by threads racing
    // past a record that is released during their search
    assert!(allocated_records() <= 16, "{} records allocated", allocated_records());
}
