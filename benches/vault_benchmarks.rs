//! Vault mutation benchmarks: cost of an atomic batch as the tree grows,
//! and the cost of publishing a snapshot readers can keep observing.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rulevault::backend_evalexpr::EvalExprBackend;
use rulevault::{Engine, MutationOp, Rule, Vault};
use std::sync::Arc;

fn seeded_vault(width: u32) -> Vault<EvalExprBackend> {
    let engine = Engine::new(Arc::new(EvalExprBackend::new()));
    let vault = Vault::new(engine, None).unwrap();
    let ops: Vec<_> = (0..width)
        .map(|i| MutationOp::Add {
            rule: Rule::new(format!("r{i}"), "true"),
            parent_id: "root".to_string(),
        })
        .collect();
    vault.mutate(ops).unwrap();
    vault
}

fn bench_single_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_add");
    for width in [10u32, 100, 1_000] {
        let vault = seeded_vault(width);
        let mut next = width;

        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                vault
                    .mutate(vec![MutationOp::Add {
                        rule: Rule::new(format!("bench{next}"), "true"),
                        parent_id: "root".to_string(),
                    }])
                    .unwrap();
                next += 1;
            });
        });
    }
    group.finish();
}

fn bench_immutable_rule_under_contention(c: &mut Criterion) {
    let vault = Arc::new(seeded_vault(1_000));
    c.bench_function("immutable_rule_read", |b| {
        b.iter(|| vault.immutable_rule());
    });
}

criterion_group!(benches, bench_single_add, bench_immutable_rule_under_contention);
criterion_main!(benches);
