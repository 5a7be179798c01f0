//! Sharding Demo
//!
//! Demonstrates predicate-driven sharding: a flat set of per-school rules
//! is partitioned into shard nodes so that each school's subtree is gated
//! by its own shard expression, with a catch-all "default" shard for rules
//! that match no predicate.

use rulevault::rule::Meta;
use rulevault::{Context, EvalContext, Engine, Evaluator, Rule};
use std::sync::Arc;

use rulevault::backend_evalexpr::EvalExprBackend;

fn school_predicate(name: &'static str) -> Meta<EvalExprBackend> {
    Meta::Predicate(Arc::new(move |r: &Rule<EvalExprBackend>| r.id.starts_with(name)))
}

fn main() {
    println!("=== Sharding Demo ===\n");

    let backend = Arc::new(EvalExprBackend::new());
    let engine = Engine::new(Arc::clone(&backend));

    let mut root = Rule::new("root", "");
    root.add(Rule::new("central_attendance", "true")).unwrap();
    root.add(Rule::new("central_grades", "true")).unwrap();
    root.add(Rule::new("woodlawn_attendance", "true")).unwrap();
    root.add(Rule::new("misc_rule", "true")).unwrap();

    root.shards = Some(vec![
        Rule::new("central", "").with_meta(school_predicate("central")),
        Rule::new("woodlawn", "").with_meta(school_predicate("woodlawn")),
    ]);

    println!("Before sharding:");
    println!("{}", root.tree());

    root.build_shards().expect("shard");

    println!("After sharding (shard nodes marked with *):");
    println!("{}", root.tree());

    engine.compile(&mut root, Default::default()).expect("compile");
    let evaluator = Evaluator::new(backend);

    let result = evaluator
        .eval(&root, &Context::new(), &EvalContext::new())
        .expect("eval");
    assert!(result.results["central"].rule.is_shard);
    assert!(result.results["central"].results.contains_key("central_attendance"));
    assert!(result.results["default"].results.contains_key("misc_rule"));

    let unsharded = result.unshard().expect("unshard");
    println!("After unshard(), results are flat:");
    for r in unsharded.flat() {
        println!("  {} pass={}", r.rule.id, r.pass);
    }

    println!("\n=== Demo Complete ===");
}
