//! Benchmarks for the AIM engine
//!
//! Run with: cargo bench

use std::sync::Arc;
use std::time::Duration;

use aim::campaign::OneDimRTree;
use aim::meta::MetaStore;
use aim::query::{Q1In, QueryRequest, RtaCommunication, ScanContext};
use aim::schema::{AnalyticsSchema, DimensionRecord, DimensionSchema, Event};
use aim::storage::{ControllerConfig, ShardedController, StoreLayout};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_events(start_ts: i64, count: usize) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..count)
        .map(|i| {
            Event::new(rng.gen_range(1..=10_000), start_ts + i as i64)
                .call(rng.gen_range(1..3600), rng.gen_range(0.05..20.0))
                .long_distance(rng.gen_bool(0.3))
        })
        .collect()
}

fn controller(shards: usize) -> (Arc<AnalyticsSchema>, ShardedController) {
    let schema = Arc::new(AnalyticsSchema::standard());
    let layout = Arc::new(StoreLayout::new(&schema, &DimensionSchema::new()));
    let rta = Arc::new(RtaCommunication::new(ScanContext::new(
        Arc::clone(&schema),
        Arc::clone(&layout),
        shards,
    )));
    let config = ControllerConfig {
        shards,
        ..ControllerConfig::default()
    };
    let ctrl = ShardedController::new(config, layout, rta).unwrap();
    (schema, ctrl)
}

fn bench_rtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("rtree");

    for size in [100, 1000, 10000] {
        let mut rng = StdRng::seed_from_u64(size as u64);
        let items: Vec<(u32, u32, usize)> = (0..size)
            .map(|i| {
                let lo = rng.gen_range(0..1000u32);
                (lo, lo + rng.gen_range(0..100), i)
            })
            .collect();
        let tree = OneDimRTree::build(items);

        group.bench_function(format!("stab_{}", size), |b| {
            let mut key = 0u32;
            b.iter(|| {
                key = (key + 37) % 1100;
                let mut hits = 0usize;
                tree.visit(black_box(key), |_| hits += 1);
                hits
            })
        });
    }

    group.finish();
}

fn bench_campaign_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("campaigns");

    let mut store = MetaStore::in_memory().unwrap();
    store.populate_standard(42, 300).unwrap();
    let schema = store.load_schema().unwrap();
    let index = store.load_campaign_index(&schema).unwrap();

    let records: Vec<Vec<u8>> = random_events(1_325_376_000_000, 1000)
        .iter()
        .map(|e| schema.record_from_event(e))
        .collect();

    group.throughput(Throughput::Elements(records.len() as u64));
    group.bench_function("match_300_campaigns", |b| {
        b.iter(|| {
            records
                .iter()
                .map(|r| index.match_campaigns(black_box(r)).count())
                .sum::<usize>()
        })
    });

    group.finish();
}

fn bench_controller(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller");

    let (schema, ctrl) = controller(4);
    let mut rng = StdRng::seed_from_u64(1);
    for key in 1..=10_000u64 {
        let dim = DimensionRecord::random(key, &mut rng).to_bytes();
        ctrl.populate(key, &schema.default_record(0), &dim).unwrap();
    }
    let events = random_events(1_325_376_000_000, 1000);

    group.throughput(Throughput::Elements(events.len() as u64));
    group.bench_function("read_update_write", |b| {
        b.iter(|| {
            for event in &events {
                let prev = ctrl.read(event.caller_id).unwrap();
                let next = schema.update_record(&prev, event);
                ctrl.write(event.caller_id, next).unwrap();
            }
        })
    });

    group.bench_function("merge_deltas", |b| {
        b.iter_batched(
            || {
                for event in &events {
                    ctrl.write(event.caller_id, schema.record_from_event(event))
                        .unwrap();
                }
            },
            |_| {
                for shard in 0..ctrl.num_shards() {
                    ctrl.apply_updates(shard).unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    group.sample_size(20);

    for records in [10_000u64, 100_000] {
        let (schema, ctrl) = controller(2);
        let mut rng = StdRng::seed_from_u64(records);
        for key in 1..=records {
            let dim = DimensionRecord::random(key, &mut rng).to_bytes();
            ctrl.populate(key, &schema.default_record(0), &dim).unwrap();
        }

        group.throughput(Throughput::Elements(records));
        group.bench_function(format!("q1_{}", records), |b| {
            let rta = ctrl.communication();
            b.iter(|| {
                let query = rta.create_query_object(&QueryRequest::Q1(Q1In { alpha: 2 }));
                rta.enqueue(query);
                ctrl.run_cycle().unwrap();
                let finished = rta.next_to_poll(Duration::from_millis(10)).unwrap();
                finished.pop_result().unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_rtree,
    bench_campaign_matching,
    bench_controller,
    bench_scan
);
criterion_main!(benches);
