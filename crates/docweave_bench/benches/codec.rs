//! Canonical CBOR codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docweave_bench::category_document;
use docweave_codec::{from_cbor, to_canonical_cbor, Document, DocumentId};

/// Create a flat order document.
fn order_document() -> Document {
    Document::new()
        .with("_id", DocumentId::new())
        .with("title", "Order")
        .with("quantity", 3)
        .with("product", Document::new().with("title", "Product"))
}

/// Benchmark encoding.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    group.bench_function("order", |b| {
        let document = order_document();
        b.iter(|| black_box(to_canonical_cbor(black_box(&document))));
    });

    for (depth, width) in [(2, 3), (3, 4), (4, 4)].iter() {
        let document = category_document(*depth, *width);
        let size = to_canonical_cbor(&document).len();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::new("category", format!("d{depth}_w{width}")),
            &document,
            |b, document| {
                b.iter(|| black_box(to_canonical_cbor(black_box(document))));
            },
        );
    }

    group.finish();
}

/// Benchmark decoding.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    group.bench_function("order", |b| {
        let encoded = to_canonical_cbor(&order_document());
        b.iter(|| {
            let decoded = from_cbor(black_box(&encoded)).unwrap();
            black_box(decoded);
        });
    });

    for (depth, width) in [(2, 3), (3, 4), (4, 4)].iter() {
        let encoded = to_canonical_cbor(&category_document(*depth, *width));
        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("category", format!("d{depth}_w{width}")),
            &encoded,
            |b, encoded| {
                b.iter(|| {
                    let decoded = from_cbor(black_box(encoded)).unwrap();
                    black_box(decoded);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);

criterion_main!(benches);
