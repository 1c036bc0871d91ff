use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use trialgraph::graph::GraphStore;
use trialgraph::loader::build_transaction;
use trialgraph::{InferenceEngine, RawDrug, RawSponsor, RawStudy, RecordCleaner};

const DESCRIPTIONS: &[&str] = &[
    "Oral tablet administered daily",
    "Drug administered via IV infusion over 30 minutes.",
    "Subcutaneous injection once weekly",
    "Apply cream topically twice a day",
    "Matching placebo",
    "",
];

fn raw_study(i: usize) -> RawStudy {
    RawStudy {
        nct_id: Some(format!("NCT{:08}", i)),
        brief_title: Some(format!("study {}", i)),
        phase: Some("PHASE3".to_string()),
        overall_status: Some("COMPLETED".to_string()),
        drugs: (0..3)
            .map(|d| RawDrug {
                name: Some(format!("drug {}", (i + d) % 500)),
                description: Some(DESCRIPTIONS[(i + d) % DESCRIPTIONS.len()].to_string()),
            })
            .collect(),
        conditions: vec![Some(format!("condition {}", i % 200))],
        sponsors: vec![RawSponsor {
            name: Some(format!("sponsor {}", i % 50)),
            class: Some("INDUSTRY".to_string()),
        }],
    }
}

/// Benchmark keyword inference over a single description
fn bench_inference(c: &mut Criterion) {
    let engine = InferenceEngine::default();
    let mut group = c.benchmark_group("inference");

    for (i, text) in DESCRIPTIONS.iter().enumerate() {
        group.bench_with_input(BenchmarkId::from_parameter(i), text, |b, text| {
            b.iter(|| criterion::black_box(engine.infer(Some(text))));
        });
    }
    group.finish();
}

/// Benchmark record cleaning, sequential vs rayon
fn bench_cleaning(c: &mut Criterion) {
    let cleaner = RecordCleaner::default();
    let mut group = c.benchmark_group("cleaning");

    for size in [100, 1000, 10_000].iter() {
        let raws: Vec<RawStudy> = (0..*size).map(raw_study).collect();
        group.bench_with_input(BenchmarkId::new("sequential", size), &raws, |b, raws| {
            b.iter(|| criterion::black_box(cleaner.clean_all(raws, false)));
        });
        group.bench_with_input(BenchmarkId::new("parallel", size), &raws, |b, raws| {
            b.iter(|| criterion::black_box(cleaner.clean_all(raws, true)));
        });
    }
    group.finish();
}

/// Benchmark applying one batch transaction to a fresh store
fn bench_batch_upsert(c: &mut Criterion) {
    let cleaner = RecordCleaner::default();
    let mut group = c.benchmark_group("batch_upsert");

    for size in [100, 500, 2000].iter() {
        let cleaned: Vec<_> = (0..*size)
            .map(raw_study)
            .filter_map(|raw| cleaner.clean(&raw).ok())
            .collect();
        let tx = build_transaction(&cleaned);

        group.bench_with_input(BenchmarkId::from_parameter(size), &tx, |b, tx| {
            b.iter(|| {
                let mut store = GraphStore::new();
                criterion::black_box(store.apply_transaction(tx).map(|stats| stats.nodes_created))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_inference, bench_cleaning, bench_batch_upsert);
criterion_main!(benches);
