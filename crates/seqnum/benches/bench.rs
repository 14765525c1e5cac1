use chrono::{TimeZone, Utc};
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use seqnum::{
    CountAllocator, Driver, DriverConfig, FixedClock, LockScope, MaxAllocator,
    MemoryStore, NumberAllocator, OrderCreator, StoreConfig,
};
use std::time::Instant;
use tokio::runtime::Builder;

// Orders created per benchmark iteration. Must stay below the daily capacity
// since every iteration numbers a single day.
const TOTAL_ORDERS: u64 = 4096;

fn clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap())
}

/// Sequential creations on one task: the cost of a single locked statement.
fn bench_sequential<A>(c: &mut Criterion, group_name: &str, allocator: impl Fn() -> A + Copy)
where
    A: NumberAllocator + 'static,
{
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_ORDERS));

    group.bench_function(format!("elems/{}", TOTAL_ORDERS), |b| {
        let rt = Builder::new_multi_thread()
            .enable_all()
            .worker_threads(1)
            .build()
            .unwrap();

        b.to_async(&rt).iter_custom(|iters| async move {
            let start = Instant::now();
            for _ in 0..iters {
                let creator = OrderCreator::with_clock(MemoryStore::default(), allocator(), clock());
                for _ in 0..TOTAL_ORDERS {
                    black_box(creator.create(0).await.unwrap());
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Full driver runs with many creators contending for the same day.
fn bench_driver<A>(
    c: &mut Criterion,
    group_name: &str,
    lock_scope: LockScope,
    allocator: impl Fn() -> A + Copy,
) where
    A: NumberAllocator + 'static,
{
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_ORDERS));

    for parallelism in [1, 8, 32] {
        group.bench_function(format!("parallelism/{}", parallelism), |b| {
            let rt = Builder::new_multi_thread().enable_all().build().unwrap();

            b.to_async(&rt).iter_custom(|iters| async move {
                let start = Instant::now();
                for _ in 0..iters {
                    let store =
                        MemoryStore::new(StoreConfig::default().with_lock_scope(lock_scope));
                    let driver = Driver::new(
                        OrderCreator::with_clock(store, allocator(), clock()),
                        DriverConfig::new(TOTAL_ORDERS, parallelism).unwrap(),
                    );
                    let report = driver.run().await.unwrap();
                    assert!(report.is_consistent());
                    black_box(report);
                }
                start.elapsed()
            });
        });
    }

    group.finish();
}

fn benchmark_sequential_max(c: &mut Criterion) {
    bench_sequential(c, "sequential/max", || MaxAllocator);
}

fn benchmark_sequential_count(c: &mut Criterion) {
    bench_sequential(c, "sequential/count", || CountAllocator);
}

fn benchmark_driver_table_max(c: &mut Criterion) {
    bench_driver(c, "driver/table/max", LockScope::Table, || MaxAllocator);
}

fn benchmark_driver_day_max(c: &mut Criterion) {
    bench_driver(c, "driver/day/max", LockScope::Day, || MaxAllocator);
}

fn benchmark_driver_table_count(c: &mut Criterion) {
    bench_driver(c, "driver/table/count", LockScope::Table, || CountAllocator);
}

criterion_group!(
    benches,
    benchmark_sequential_max,
    benchmark_sequential_count,
    benchmark_driver_table_max,
    benchmark_driver_day_max,
    benchmark_driver_table_count,
);
criterion_main!(benches);
