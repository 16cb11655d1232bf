//! マージ処理のベンチマーク
//!
//! 一つの街区の下に大量の住居番号が並ぶ、子の多い階層を取り込む速度を計測します。

use std::time::Duration;

use addrdict::dataset::DatasetId;
use addrdict::merge::MergeEngine;
use addrdict::{NormalizedRecord, PriorityTable, Registry, Segment};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

fn records(fan_out: usize) -> Vec<NormalizedRecord> {
    (0..fan_out)
        .map(|i| {
            NormalizedRecord::new(vec![
                Segment::new(1, "東京都"),
                Segment::new(2, "千代田区"),
                Segment::new(3, "丸の内"),
                Segment::new(4, "一丁目"),
                Segment::new(5, "1"),
                Segment::new(6, format!("{}", i + 1)).with_point(139.76, 35.68),
            ])
        })
        .collect()
}

fn benchmark_fan_out(c: &mut Criterion) {
    let priorities = PriorityTable::presets();

    let mut group = c.benchmark_group("Merge (high fan-out)");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(20);

    for fan_out in [1_000, 10_000, 50_000] {
        let input = records(fan_out);
        group.throughput(Throughput::Elements(fan_out as u64));
        group.bench_with_input(BenchmarkId::new("ingest", fan_out), &input, |b, input| {
            b.iter(|| {
                let mut registry = Registry::with_capacity(input.len() + 5);
                let mut engine = MergeEngine::new(&mut registry, &priorities);
                for record in input {
                    engine.ingest(record, 1, DatasetId(1)).unwrap();
                }
                registry.len()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_fan_out);
criterion_main!(benches);
