//! Performance benchmarks for state sync and event replay.

use component_sync::{
    Bridge, ConflictStrategy, RollbackTarget, StateDiff, StateManager, StateMap, StateSource,
    SyncConfig, UpdateMode, Version,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

fn wide_state(keys: usize, salt: i64) -> StateMap {
    (0..keys)
        .map(|i| (format!("key{i}"), json!({"value": i as i64 + salt, "label": "item"})))
        .collect()
}

/// Benchmark partial updates with history at capacity.
fn bench_update_with_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_with_eviction");

    for max_history in [10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("max_history", max_history),
            &max_history,
            |b, &max_history| {
                let manager = StateManager::new(SyncConfig::with_max_history(max_history)).unwrap();
                for i in 0..max_history as i64 {
                    manager.set_state("s", wide_state(20, i), StateSource::Internal);
                }

                let mut i = 0i64;
                b.iter(|| {
                    i += 1;
                    let partial: StateMap = [("key0".to_string(), Value::from(i))].into_iter().collect();
                    black_box(manager.update_state("s", partial, UpdateMode::Merge, StateSource::Internal));
                });
            },
        );
    }

    group.finish();
}

/// Benchmark conflicting syncs under each accepting strategy.
fn bench_conflicting_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("conflicting_sync");

    for strategy in [ConflictStrategy::ClientWins, ConflictStrategy::Merge] {
        group.bench_with_input(
            BenchmarkId::new("strategy", format!("{strategy:?}")),
            &strategy,
            |b, &strategy| {
                let manager = StateManager::with_strategy(strategy);
                manager.set_state("s", wide_state(50, 0), StateSource::Internal);
                let client = wide_state(50, 1);

                b.iter(|| {
                    // Always based on v1, so every sync after the first conflicts.
                    black_box(manager.sync_from_client("s", client.clone(), Version(1)).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark diffing states of increasing width.
fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    for keys in [10, 100, 1000] {
        let old = wide_state(keys, 0);
        let mut new = wide_state(keys, 0);
        for i in (0..keys).step_by(3) {
            new.insert(format!("key{i}"), json!(i));
        }

        group.bench_with_input(BenchmarkId::new("keys", keys), &keys, |b, _| {
            b.iter(|| {
                let diff = StateDiff::diff(black_box(&old), black_box(&new));
                black_box(diff.apply(&old));
            });
        });
    }

    group.finish();
}

/// Benchmark rollback across a full history.
fn bench_rollback(c: &mut Criterion) {
    c.bench_function("rollback_half_history", |b| {
        b.iter_batched(
            || {
                let manager = StateManager::new(SyncConfig::with_max_history(500)).unwrap();
                for i in 0..500 {
                    manager.set_state("s", wide_state(5, i), StateSource::Internal);
                }
                manager
            },
            |manager| black_box(manager.rollback("s", RollbackTarget::Steps(250))),
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark replaying recorded event logs.
fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");

    for events in [100, 1000] {
        let bridge = Bridge::new();
        bridge.register_callback("app", "action", |data| {
            black_box(data.len());
            Ok(())
        });
        for i in 0..events {
            bridge.handle_event("app", &json!({"event": "action", "data": {"n": i}}));
        }

        group.bench_with_input(BenchmarkId::new("events", events), &events, |b, _| {
            b.iter(|| black_box(bridge.replay_events("app")));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_update_with_eviction,
    bench_conflicting_sync,
    bench_diff,
    bench_rollback,
    bench_replay,
);
criterion_main!(benches);
