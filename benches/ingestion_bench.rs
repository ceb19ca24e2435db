//! Ingestion throughput: schema inference, PII detection and tokenization.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

use edgenode_core::pipeline::IngestionEngine;
use edgenode_core::security::RedactionStore;

fn customer_records(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "customer_name": format!("Customer Number {}", i % 97),
                "email": format!("user{}@example.com", i % 211),
                "phone": format!("+1 555 {:04}", i % 10_000),
                "amount": (i as f64) * 1.25,
                "active": i % 3 == 0,
                "signup_date": "2024-03-15",
                "notes": "repeat order",
            })
        })
        .collect()
}

fn bench_ingestion(c: &mut Criterion) {
    let engine = IngestionEngine::default();
    let mut group = c.benchmark_group("ingestion");

    for size in [100usize, 1_000, 10_000] {
        let records = customer_records(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| {
                let store = RedactionStore::new();
                black_box(engine.process(&store, black_box(records), None))
            })
        });
    }

    group.finish();
}

fn bench_no_pii(c: &mut Criterion) {
    let engine = IngestionEngine::default();
    let records: Vec<Value> = (0..1_000)
        .map(|i| json!({"sku": format!("SKU-{}", i), "qty": i, "in_stock": true}))
        .collect();

    c.bench_function("ingestion_no_pii_1000", |b| {
        b.iter(|| {
            let store = RedactionStore::new();
            black_box(engine.process(&store, black_box(&records), None))
        })
    });
}

criterion_group!(benches, bench_ingestion, bench_no_pii);
criterion_main!(benches);
