//! Basic benchmarks for the `segment_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use criterion::{Criterion, criterion_group, criterion_main};
use segment_pool::SegmentPool;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

const ITEM_SIZE: usize = 32;
const SEGMENT_CAPACITY: usize = 128;

fn new_pool() -> SegmentPool {
    SegmentPool::new(ITEM_SIZE, SEGMENT_CAPACITY).unwrap()
}

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("sp_basic");

    group.bench_function("allocate_first", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(new_pool)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for pool in &mut pools {
                _ = black_box(pool.allocate());
            }

            start.elapsed()
        });
    });

    group.bench_function("allocate_growing", |b| {
        b.iter_custom(|iters| {
            let mut pool = new_pool();

            let start = Instant::now();

            for _ in 0..iters {
                _ = black_box(pool.allocate());
            }

            start.elapsed()
        });
    });

    group.bench_function("free_allocate_tail", |b| {
        b.iter_custom(|iters| {
            let mut pool = new_pool();
            let item = pool.allocate();
            _ = pool.allocate();

            let mut index = item.index();

            let start = Instant::now();

            for _ in 0..iters {
                pool.free(black_box(index));
                index = black_box(pool.allocate()).index();
            }

            start.elapsed()
        });
    });

    group.bench_function("free_allocate_hole", |b| {
        b.iter_custom(|iters| {
            let mut pool = new_pool();

            // Ten full segments, so every hole refill walks past full segments first.
            for _ in 0..10 * SEGMENT_CAPACITY {
                _ = pool.allocate();
            }

            let mut index = 5 * SEGMENT_CAPACITY;

            let start = Instant::now();

            for _ in 0..iters {
                pool.free(black_box(index));
                index = black_box(pool.allocate()).index();
            }

            start.elapsed()
        });
    });

    group.bench_function("lookup", |b| {
        b.iter_custom(|iters| {
            let mut pool = new_pool();

            for _ in 0..10_000 {
                _ = pool.allocate();
            }

            let start = Instant::now();

            for i in 0..iters {
                let index = usize::try_from(i % 10_000).unwrap();
                _ = black_box(pool.lookup(black_box(index)));
            }

            start.elapsed()
        });
    });

    group.bench_function("len", |b| {
        b.iter_custom(|iters| {
            let mut pool = new_pool();

            for _ in 0..10_000 {
                _ = pool.allocate();
            }

            let start = Instant::now();

            for _ in 0..iters {
                _ = black_box(pool.len());
            }

            start.elapsed()
        });
    });

    group.finish();
}
