//! Benchmarks for the bulkhead scheduler.
//!
//! Benchmarks cover:
//! - Priority queue container operations
//! - Bulkhead slot accounting
//! - Resource request tracking and rate limiter admission
//! - End-to-end submit and poll cycles

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use prometheus_bulkhead::core::{
    QueueTrackerContainer, ResourceRequestResult, ResourceTracker, TaskContext, TaskError,
    TaskExecutor, TaskManager, TaskManagerLimits, TaskManagerPolicies,
    TaskManagerPrioritySettings, TaskTracker,
};
use prometheus_bulkhead::runtime::TokioSpawner;

use async_trait::async_trait;
use tokio::runtime::Runtime;

// ============================================================================
// Test Payload and Executor
// ============================================================================

#[derive(Debug, Clone)]
struct BenchPayload {
    id: u64,
}

#[derive(Clone)]
struct BenchExecutor;

#[async_trait]
impl TaskExecutor<BenchPayload> for BenchExecutor {
    async fn execute(&self, payload: BenchPayload, _ctx: TaskContext) -> Result<(), TaskError> {
        black_box(payload.id);
        Ok(())
    }
}

fn build_task(id: u64) -> TaskTracker<BenchPayload> {
    #[allow(clippy::cast_possible_truncation)]
    let level = (id % 3) as usize;
    TaskTracker::new(BenchPayload { id }).with_priority(level)
}

// ============================================================================
// Queue Benchmarks
// ============================================================================

fn bench_container_enqueue_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("container_enqueue_dequeue");

    for size in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let container = QueueTrackerContainer::new(3, 1).unwrap();
                for i in 0..size {
                    container.enqueue(build_task(i));
                }
                let drained = container.dequeue(usize::MAX).count();
                black_box(drained);
            });
        });
    }
    group.finish();
}

fn bench_container_batched_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("container_batched_dequeue");

    for batch in [1, 16, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                let container = QueueTrackerContainer::new(3, 1).unwrap();
                for i in 0..1_000 {
                    container.enqueue(build_task(i));
                }
                while !container.is_empty() {
                    black_box(container.dequeue(batch).count());
                }
            });
        });
    }
    group.finish();
}

// ============================================================================
// Bulkhead and Resource Benchmarks
// ============================================================================

fn bench_bulkhead_increment_decrement(c: &mut Criterion) {
    c.bench_function("bulkhead_increment_decrement", |b| {
        let settings = TaskManagerPrioritySettings::new(1, 64, 8);
        b.iter(|| {
            for _ in 0..64 {
                black_box(settings.increment());
            }
            for _ in 0..64 {
                settings.decrement(false);
            }
        });
    });
}

fn bench_resource_start_end(c: &mut Criterion) {
    let tracker = ResourceTracker::default().with_profiles(["bench-db"]);
    let profile = tracker.profile("bench-db").unwrap();
    let consumer = tracker.register_consumer("bench", Some(&profile)).unwrap();

    c.bench_function("resource_start_end", |b| {
        b.iter(|| {
            consumer
                .track("bench", "request")
                .end(ResourceRequestResult::Success);
        });
    });
}

fn bench_rate_limiter_admit(c: &mut Criterion) {
    let tracker = ResourceTracker::default().with_profiles(["a", "b", "c"]);
    let profiles: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|id| tracker.profile(id).unwrap())
        .collect();
    let limiter = tracker.register_request_rate_limiter("bench", &profiles).unwrap();

    c.bench_function("rate_limiter_try_admit", |b| {
        b.iter(|| black_box(limiter.try_admit()));
    });
}

// ============================================================================
// End-to-End Benchmarks
// ============================================================================

fn bench_submit_and_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_and_poll");

    for task_count in [50_u64, 200] {
        group.throughput(Throughput::Elements(task_count));
        group.bench_with_input(
            BenchmarkId::from_parameter(task_count),
            &task_count,
            |b, &task_count| {
                b.to_async(Runtime::new().unwrap()).iter(|| async move {
                    let priorities = (0..3)
                        .map(|level| TaskManagerPrioritySettings::new(level, 16, 4))
                        .collect();
                    let manager = TaskManager::new(
                        TaskManagerLimits {
                            poll_interval: Duration::from_millis(1),
                            ..TaskManagerLimits::default()
                        },
                        priorities,
                        Arc::new(ResourceTracker::default()),
                        TaskManagerPolicies::default(),
                        BenchExecutor,
                        TokioSpawner::current(),
                    )
                    .unwrap();

                    for i in 0..task_count {
                        black_box(manager.submit(build_task(i)).unwrap());
                    }
                    while manager.queued() > 0 {
                        manager.poll_once();
                        tokio::task::yield_now().await;
                    }
                    manager.stop();
                });
            },
        );
    }
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(
    queue_benches,
    bench_container_enqueue_dequeue,
    bench_container_batched_dequeue
);

criterion_group!(
    resource_benches,
    bench_bulkhead_increment_decrement,
    bench_resource_start_end,
    bench_rate_limiter_admit
);

criterion_group!(scenario_benches, bench_submit_and_poll);

criterion_main!(queue_benches, resource_benches, scenario_benches);
