//! Basic Tree Example
//!
//! Demonstrates building a rule tree, compiling it, and evaluating it
//! against a data context. Shows the full pipeline: Rule tree → Engine
//! compile → Evaluator rollup.

use rulevault::backend_evalexpr::{EvalExprBackend, EvalExprValue};
use rulevault::{Context, EvalContext, Engine, Evaluator, Rule};
use std::sync::Arc;

fn main() {
    println!("=== Basic Tree Example ===\n");

    let backend = Arc::new(EvalExprBackend::new());
    let engine = Engine::new(Arc::clone(&backend));

    println!("Building a rule tree: is the applicant eligible?");
    let mut root = Rule::new("eligible", "");
    root.add(Rule::new("over_18", "age >= 18")).unwrap();
    root.add(Rule::new("has_income", "income > 0")).unwrap();
    root.add(Rule::new("not_blocked", "blocked == false")).unwrap();
    println!("  eligible");
    println!("    over_18:     age >= 18");
    println!("    has_income:  income > 0");
    println!("    not_blocked: blocked == false\n");

    engine.compile(&mut root, Default::default()).expect("compile");
    let evaluator = Evaluator::new(backend);

    println!("Example 1: passing applicant");
    let mut data: Context<EvalExprValue> = Context::new();
    data.insert("age".to_string(), EvalExprValue(evalexpr::Value::Int(25)));
    data.insert("income".to_string(), EvalExprValue(evalexpr::Value::Int(50_000)));
    data.insert("blocked".to_string(), EvalExprValue(evalexpr::Value::Boolean(false)));

    let result = evaluator
        .eval(&root, &data, &EvalContext::new())
        .expect("eval");
    println!("{result}");
    assert!(result.pass, "applicant should be eligible");

    println!("Example 2: underage applicant");
    let mut data: Context<EvalExprValue> = Context::new();
    data.insert("age".to_string(), EvalExprValue(evalexpr::Value::Int(16)));
    data.insert("income".to_string(), EvalExprValue(evalexpr::Value::Int(50_000)));
    data.insert("blocked".to_string(), EvalExprValue(evalexpr::Value::Boolean(false)));

    let result = evaluator
        .eval(&root, &data, &EvalContext::new())
        .expect("eval");
    println!("{result}");
    assert!(!result.pass, "underage applicant should fail");
    assert!(!result.results["over_18"].pass);

    let summary = result.summary();
    println!(
        "summary: {}/{} passed",
        summary.passed, summary.total
    );

    println!("\n=== Example Complete ===");
}
