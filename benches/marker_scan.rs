//! Marker scanning benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use logdump_core::core::framing::{find, MarkerScanner, END_MARKER};

fn dump(records: usize) -> Vec<u8> {
    let line = b"{\"device\":\"esp32\",\"timestamp\":\"2025-09-27T12:34:56Z\",\"temp_c\":21.50}\n";
    let mut data = line.repeat(records);
    data.extend_from_slice(END_MARKER);
    data
}

fn scan_benchmark(c: &mut Criterion) {
    let data = dump(2_000);

    let mut group = c.benchmark_group("marker_scan");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("whole_buffer", |b| {
        b.iter(|| black_box(find(black_box(&data), END_MARKER)))
    });

    group.bench_function("incremental_256", |b| {
        b.iter(|| {
            let mut scanner = MarkerScanner::new(END_MARKER);
            let mut buffer = Vec::with_capacity(data.len());
            for chunk in data.chunks(256) {
                buffer.extend_from_slice(chunk);
                if let Some(pos) = scanner.scan(&buffer) {
                    return black_box(pos);
                }
            }
            0
        })
    });

    group.finish();
}

criterion_group!(benches, scan_benchmark);
criterion_main!(benches);
