// Benchmark for the rolling history and telemetry decoding
// Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use thermo_rs::history::{Sample, TimeSeriesBuffer};
use thermo_shared::protocol;

fn bench_history_append(c: &mut Criterion) {
    c.bench_function("append 10k samples into 100-point window", |b| {
        b.iter(|| {
            let mut buffer = TimeSeriesBuffer::new(100, 2.0);
            for i in 0..10_000 {
                buffer.append(Sample {
                    time: i as f64 * 0.2,
                    measured: 20.0 + (i % 50) as f64 * 0.1,
                    setpoint: 25.0,
                });
            }
            black_box(buffer.bounds());
        });
    });
}

fn bench_snapshot_vectors(c: &mut Criterion) {
    let mut buffer = TimeSeriesBuffer::new(100, 2.0);
    for i in 0..100 {
        buffer.append(Sample {
            time: i as f64 * 0.2,
            measured: 20.0 + i as f64 * 0.05,
            setpoint: 25.0,
        });
    }
    c.bench_function("snapshot vectors of full window", |b| {
        b.iter(|| {
            black_box((buffer.times(), buffer.measured(), buffer.setpoints(), buffer.bounds()));
        });
    });
}

fn bench_decode_batch(c: &mut Criterion) {
    let mut batch = Vec::new();
    for i in 0..50 {
        batch.extend_from_slice(format!("{:.2};25.00\n", 20.0 + i as f64 * 0.1).as_bytes());
    }
    c.bench_function("decode last line of 50-line batch", |b| {
        b.iter(|| black_box(protocol::decode(black_box(&batch))));
    });
}

criterion_group!(benches, bench_history_append, bench_snapshot_vectors, bench_decode_batch);
criterion_main!(benches);
