//! Microbenchmarks for the write and read hot paths.
//!
//! Run with: `cargo bench -p hourglass -- increment`

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hourglass::{
    CounterStore, FrequencyRequest, FrequencyStore, InMemoryTsdb, Kind, RangeQuery, Rollup,
    RollupSchedule, WriteTarget,
};

const EVENTS: Kind = Kind::from_static("events-per-group");
const RELEASES: Kind = Kind::from_static("releases-per-group");

const BASE: u64 = 1_700_000_000;

/// A store with a realistic three-rollup schedule.
fn setup_store() -> InMemoryTsdb {
    let schedule = RollupSchedule::new(vec![
        Rollup::new(10, 360),
        Rollup::new(3600, 168),
        Rollup::new(86_400, 90),
    ])
    .unwrap();
    InMemoryTsdb::new(schedule)
}

fn bench_increment_single(c: &mut Criterion) {
    let store = setup_store();
    let mut ts = BASE;

    c.bench_function("increment/single_key", |b| {
        b.iter(|| {
            ts += 1;
            store
                .increment(
                    black_box(&EVENTS),
                    black_box("group-1"),
                    black_box(1),
                    &WriteTarget::at(ts).in_environment(3),
                )
                .unwrap();
        });
    });
}

fn bench_increment_many_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("increment/key_count");

    for count in [1, 10, 100, 1000] {
        let store = setup_store();
        let keys: Vec<String> = (0..count).map(|i| format!("group-{i}")).collect();
        let mut ts = BASE;

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                ts += 1;
                let target = WriteTarget::at(ts);
                for key in &keys {
                    store
                        .increment(black_box(&EVENTS), black_box(key), 1, &target)
                        .unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_record_frequencies(c: &mut Criterion) {
    let store = setup_store();
    let request = (0..20).fold(FrequencyRequest::new(RELEASES), |request, i| {
        request.score("group-1", format!("release-{i}"), 1.0)
    });
    let mut ts = BASE;

    c.bench_function("record_many/20_members", |b| {
        b.iter(|| {
            ts += 1;
            store
                .record_many(black_box(std::slice::from_ref(&request)), &WriteTarget::at(ts))
                .unwrap();
        });
    });
}

fn bench_get_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_range/buckets");
    let store = setup_store();
    for offset in 0..3600 {
        store
            .increment(&EVENTS, "group-1", 1, &WriteTarget::at(BASE + offset))
            .unwrap();
    }

    for buckets in [6u64, 60, 360] {
        let query = RangeQuery::new(BASE, BASE + buckets * 10).granularity(10);
        group.bench_with_input(BenchmarkId::from_parameter(buckets), &query, |b, query| {
            b.iter(|| {
                store
                    .get_range(black_box(&EVENTS), &["group-1"], black_box(query))
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_increment_single,
    bench_increment_many_keys,
    bench_record_frequencies,
    bench_get_range,
);
criterion_main!(benches);
