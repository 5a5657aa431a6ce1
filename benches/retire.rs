use std::sync::atomic::{AtomicPtr, Ordering};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use hazqueue::{ConfigBuilder, HazardPointer, CONFIG};

fn init_config() {
    CONFIG.init_once(|| ConfigBuilder::new().init_cache(128).build());
}

fn bench_acquire(c: &mut Criterion) {
    init_config();
    let global = AtomicPtr::new(Box::into_raw(Box::new(1)));

    c.bench_function("acquire_atomic", |b| {
        let mut hazard = HazardPointer::new();
        b.iter(|| black_box(hazard.acquire_atomic(&global)));
    });

    c.bench_function("new_hazard_pointer", |b| {
        b.iter(|| black_box(HazardPointer::<i32>::new()));
    });

    unsafe { drop(Box::from_raw(global.load(Ordering::Relaxed))) };
}

fn bench_retire(c: &mut Criterion) {
    init_config();
    let global = AtomicPtr::new(Box::into_raw(Box::new(1)));

    let mut group = c.benchmark_group("retire");
    for steps in [1, 100, 10_000].iter() {
        group.throughput(Throughput::Elements(*steps as u64));
        group.bench_with_input(BenchmarkId::from_parameter(steps), steps, |b, &steps| {
            b.iter(|| {
                for _ in 0..steps {
                    let unlinked = global.swap(Box::into_raw(Box::new(1)), Ordering::Relaxed);
                    unsafe { HazardPointer::schedule_deletion(unlinked) };
                }
            });
        });
    }

    group.finish();
    unsafe { drop(Box::from_raw(global.load(Ordering::Relaxed))) };
}

criterion_group!(benches, bench_acquire, bench_retire);
criterion_main!(benches);
