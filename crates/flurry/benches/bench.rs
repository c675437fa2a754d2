use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use flurry::{LockSnowflakeGenerator, SystemClock, TWITTER_EPOCH, TimeSource};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

struct FixedMockTime {
    millis: u64,
}

impl TimeSource for FixedMockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

// Number of IDs generated per benchmark iteration (per-thread for
// multi-threaded). One full sequence, so a fixed clock never has to spin.
const TOTAL_IDS: usize = 4096;

/// Benchmarks the hot path where the clock never moves and the sequence
/// never overflows.
fn bench_fixed_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock/fixed");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let generator = LockSnowflakeGenerator::new(
                    0,
                    0,
                    FixedMockTime {
                        millis: TWITTER_EPOCH.as_millis() as u64 + 1,
                    },
                );
                for _ in 0..TOTAL_IDS {
                    black_box(generator.try_next_id().unwrap());
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks the wall clock, including spins on sequence exhaustion.
fn bench_system_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock/system");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    let generator = LockSnowflakeGenerator::new(0, 0, SystemClock);
    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter(|| {
            for _ in 0..TOTAL_IDS {
                black_box(generator.try_next_id().unwrap());
            }
        });
    });

    group.finish();
}

/// Benchmarks contention with several threads sharing one generator.
fn bench_system_clock_threaded(c: &mut Criterion) {
    const THREADS: usize = 4;

    let mut group = c.benchmark_group("lock/system/threaded");
    group.throughput(Throughput::Elements((TOTAL_IDS * THREADS) as u64));

    let generator = LockSnowflakeGenerator::new(0, 0, SystemClock);
    group.bench_function(format!("threads/{THREADS}/elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let barrier = Arc::new(Barrier::new(THREADS + 1));
            let start = scope(|s| {
                for _ in 0..THREADS {
                    let generator = generator.clone();
                    let barrier = Arc::clone(&barrier);
                    s.spawn(move || {
                        barrier.wait();
                        for _ in 0..iters {
                            for _ in 0..TOTAL_IDS {
                                black_box(generator.try_next_id().unwrap());
                            }
                        }
                    });
                }
                barrier.wait();
                Instant::now()
            });
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_fixed_clock,
    bench_system_clock,
    bench_system_clock_threaded
);
criterion_main!(benches);
