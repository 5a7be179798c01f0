//! Evaluation performance benchmarks: sequential vs. bounded parallel
//! rollup over wide rule trees.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rulevault::backend_evalexpr::EvalExprBackend;
use rulevault::{CompileOptions, Context, EvalContext, Engine, Evaluator, Rule};
use std::sync::Arc;

fn wide_tree(width: u32) -> Rule<EvalExprBackend> {
    let mut root = Rule::new("root", "");
    for i in 0..width {
        root.add(Rule::new(format!("c{i}"), format!("{i} % 7 != 0")))
            .unwrap();
    }
    root
}

fn bench_sequential_rollup(c: &mut Criterion) {
    let backend = Arc::new(EvalExprBackend::new());
    let engine = Engine::new(Arc::clone(&backend));
    let evaluator = Evaluator::new(backend);

    let mut group = c.benchmark_group("sequential_rollup");
    for width in [10u32, 100, 1_000] {
        let mut root = wide_tree(width);
        engine.compile(&mut root, CompileOptions::default()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| evaluator.eval(&root, &Context::new(), &EvalContext::new()));
        });
    }
    group.finish();
}

fn bench_parallel_rollup(c: &mut Criterion) {
    let backend = Arc::new(EvalExprBackend::new());
    let engine = Engine::new(Arc::clone(&backend));
    let evaluator = Evaluator::new(backend);

    let mut group = c.benchmark_group("parallel_rollup");
    for width in [100u32, 1_000, 10_000] {
        let mut root = wide_tree(width);
        root.eval_options = root.eval_options.with_parallel(32, 64, 8);
        engine.compile(&mut root, CompileOptions::default()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| evaluator.eval(&root, &Context::new(), &EvalContext::new()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sequential_rollup, bench_parallel_rollup);
criterion_main!(benches);
