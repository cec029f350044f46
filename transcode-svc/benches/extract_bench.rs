//! Unit extraction and layer scanning benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use transcode_svc::{extract, DqScan, Framing};

/// Build an access unit of `count` slices of `size` bytes each.
fn access_unit(count: usize, size: usize, framing: Framing) -> Vec<u8> {
    let mut data = Vec::with_capacity(count * (size + 4));
    for i in 0..count {
        let header = if i % 2 == 0 { 0x65 } else { 0x74 };
        let mut unit = vec![header];
        if header == 0x74 {
            unit.extend_from_slice(&[0x80, ((i % 8) as u8) << 4, 0x00]);
        }
        // avoid accidental start codes in the payload
        unit.resize(size, 0xAA);
        match framing {
            Framing::LengthPrefixed(width) => {
                let len = (unit.len() as u32).to_be_bytes();
                data.extend_from_slice(&len[4 - width as usize..]);
            }
            Framing::StartCode => data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]),
        }
        data.extend_from_slice(&unit);
    }
    data
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");

    for &(count, size) in &[(4usize, 256usize), (16, 1500), (64, 4096)] {
        for framing in [Framing::LengthPrefixed(4), Framing::StartCode] {
            let data = access_unit(count, size, framing);
            let name = match framing {
                Framing::LengthPrefixed(_) => "length_prefixed",
                Framing::StartCode => "start_code",
            };
            group.throughput(Throughput::Bytes(data.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(name, format!("{}x{}", count, size)),
                &data,
                |b, data| {
                    b.iter(|| {
                        let units = extract::units(black_box(data), framing).unwrap();
                        black_box(units.count())
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_dq_scan(c: &mut Criterion) {
    let data = access_unit(32, 1500, Framing::LengthPrefixed(4));
    c.bench_function("dq_scan_32_units", |b| {
        b.iter(|| {
            let units = extract::units(black_box(&data), Framing::LengthPrefixed(4)).unwrap();
            black_box(DqScan::scan(units))
        })
    });
}

criterion_group!(benches, bench_extract, bench_dq_scan);
criterion_main!(benches);
