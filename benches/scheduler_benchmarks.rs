//! Performance benchmarks for group scheduling under the different
//! concurrency policies.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use ganger::options::{ConcurrencyStrategy, GroupSetDefaults};
use ganger::plan::RunPlan;
use ganger::scheduler::GroupScheduler;
use ganger::work::{FnWorkItem, WorkGroup};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn make_groups(groups: usize, items_per_group: usize) -> Vec<WorkGroup> {
    (0..groups)
        .map(|g| {
            let mut group = WorkGroup::new(format!("group{g}"));
            for i in 0..items_per_group {
                group.push(Arc::new(FnWorkItem::passing(format!("item{g}-{i}"))));
            }
            group
        })
        .collect()
}

fn defaults(max: i32, strategy: ConcurrencyStrategy) -> GroupSetDefaults {
    GroupSetDefaults {
        max_concurrent_groups: max,
        strategy,
        ..Default::default()
    }
}

fn bench_strategies(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("strategies");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("conservative_bounded", |b| {
        b.to_async(&rt).iter_batched(
            || {
                let defaults = defaults(4, ConcurrencyStrategy::Conservative);
                GroupScheduler::new(make_groups(8, 4), defaults)
            },
            |scheduler| async move {
                black_box(scheduler.run().await.unwrap());
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("aggressive_bounded", |b| {
        b.to_async(&rt).iter_batched(
            || {
                let defaults = defaults(4, ConcurrencyStrategy::Aggressive);
                GroupScheduler::new(make_groups(8, 4), defaults)
            },
            |scheduler| async move {
                black_box(scheduler.run().await.unwrap());
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("unbounded", |b| {
        b.to_async(&rt).iter_batched(
            || {
                let defaults = defaults(-1, ConcurrencyStrategy::Conservative);
                GroupScheduler::new(make_groups(8, 4), defaults)
            },
            |scheduler| async move {
                black_box(scheduler.run().await.unwrap());
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("serial", |b| {
        b.to_async(&rt).iter_batched(
            || {
                let defaults = GroupSetDefaults {
                    parallelism_disabled: true,
                    ..Default::default()
                };
                GroupScheduler::new(make_groups(8, 4), defaults)
            },
            |scheduler| async move {
                black_box(scheduler.run().await.unwrap());
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_group_counts(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("group_counts");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(5));

    for count in [4, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.to_async(&rt).iter_batched(
                || {
                    let defaults = defaults(4, ConcurrencyStrategy::Conservative);
                    GroupScheduler::new(make_groups(count, 2), defaults)
                },
                |scheduler| async move {
                    black_box(scheduler.run().await.unwrap());
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_plan_parsing(c: &mut Criterion) {
    let mut plan = String::from("options:\n  max_concurrent_groups: 4\ngroups:\n");
    for g in 0..32 {
        plan.push_str(&format!("  - name: group{g}\n    items:\n"));
        for i in 0..4 {
            plan.push_str(&format!("      - name: item{i}\n        run: \"true\"\n"));
        }
    }

    c.bench_function("plan_parsing", |b| {
        b.iter(|| {
            let parsed: RunPlan = serde_yaml::from_str(&plan).unwrap();
            black_box(parsed);
        });
    });
}

criterion_group!(
    benches,
    bench_strategies,
    bench_group_counts,
    bench_plan_parsing
);
criterion_main!(benches);
