//! Recursive tree evaluation producing the Result tree: honours per-node
//! options, cooperative cancellation, and optional bounded parallelism.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{Backend, BackendValue};
use crate::cancel::{CancelledError, EvalContext};
use crate::rule::{EvalOptions, ParallelOptions, Rule};
use crate::result::{EvalResult, RuleRef};
use crate::schema::{Context, ResultType};

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("rule '{id}': {message}")]
    Evaluate { id: String, message: String },
    #[error("rule '{id}': panic during parallel rule evaluation")]
    PanicInParallel { id: String },
    #[error("evaluation cancelled (deadline_exceeded={deadline_exceeded})")]
    Cancelled { deadline_exceeded: bool },
    #[error("rule '{id}': expression result is not boolean-compatible for rollup")]
    NotBoolean { id: String },
    #[error("failed to build the parallel evaluation thread pool: {0}")]
    Pool(String),
}

impl From<CancelledError> for EvalError {
    fn from(e: CancelledError) -> Self {
        EvalError::Cancelled {
            deadline_exceeded: e.deadline_exceeded,
        }
    }
}

/// Accumulates child outcomes for one node's rollup: applies
/// `DiscardPass`/`DiscardFail`, tracks counters, and reports whether
/// short-circuit options demand that sibling evaluation stop.
struct RollupAccumulator<B: Backend> {
    results: HashMap<String, EvalResult<B>>,
    rules_evaluated: Vec<RuleRef>,
    eval_count: usize,
    eval_parallel_count: usize,
    discarded_fail: usize,
}

impl<B: Backend> RollupAccumulator<B> {
    fn new() -> Self {
        RollupAccumulator {
            results: HashMap::new(),
            rules_evaluated: Vec::new(),
            eval_count: 0,
            eval_parallel_count: 0,
            discarded_fail: 0,
        }
    }

    /// Returns `true` if sibling evaluation should stop after this child.
    fn offer(&mut self, id: String, result: EvalResult<B>, opts: &EvalOptions<B>, was_parallel: bool) -> bool {
        self.rules_evaluated.push(result.rule.clone());
        self.eval_count += result.eval_count;
        self.eval_parallel_count += result.eval_parallel_count + usize::from(was_parallel);

        let child_pass = result.pass;
        let discard = if child_pass {
            opts.discard_pass
        } else if let Some(max) = opts.discard_fail {
            if self.discarded_fail < max {
                self.discarded_fail += 1;
                true
            } else {
                false
            }
        } else {
            false
        };

        if !discard {
            self.results.insert(id, result);
        }

        (opts.stop_first_positive_child && child_pass) || (opts.stop_first_negative_child && !child_pass)
    }
}

/// Recursive tree evaluator bound to a single [`Backend`].
pub struct Evaluator<B: Backend> {
    backend: Arc<B>,
}

impl<B: Backend> Clone for Evaluator<B> {
    fn clone(&self) -> Self {
        Evaluator {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> Evaluator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Evaluator { backend }
    }

    pub fn eval(
        &self,
        root: &Rule<B>,
        data: &Context<B::Value>,
        ctx: &EvalContext,
    ) -> Result<EvalResult<B>, EvalError> {
        self.eval_node(root, data, ctx)
    }

    fn eval_self(
        &self,
        rule: &Rule<B>,
        data: &Context<B::Value>,
        opts: &EvalOptions<B>,
    ) -> Result<(B::Value, Option<serde_json::Value>, bool), EvalError> {
        if rule.expr.is_empty() || opts.dry_run {
            // A dry run walks the tree's shape (rollup logic, sort order,
            // discard/stop options, parallel fan-out) without invoking the
            // backend, so it never requires a compiled `program` either.
            return Ok((B::Value::from_bool(true), None, true));
        }

        let program = rule.program.as_ref().ok_or_else(|| EvalError::Evaluate {
            id: rule.id.clone(),
            message: "rule has a non-empty expression but no compiled program; call Engine::compile first".to_string(),
        })?;

        let (value, diagnostics) = self
            .backend
            .evaluate(
                data,
                &rule.expr,
                &rule.schema,
                rule.self_value.as_ref(),
                program,
                &rule.result_type,
                opts.return_diagnostics,
            )
            .map_err(|e| EvalError::Evaluate {
                id: rule.id.clone(),
                message: e.to_string(),
            })?;

        let expression_pass = match value.as_bool() {
            Some(b) => b,
            None if value.is_truthy() => true,
            None => return Err(EvalError::NotBoolean { id: rule.id.clone() }),
        };

        Ok((value, diagnostics, expression_pass))
    }

    fn eval_node(
        &self,
        rule: &Rule<B>,
        data: &Context<B::Value>,
        ctx: &EvalContext,
    ) -> Result<EvalResult<B>, EvalError> {
        let _span = tracing::trace_span!("eval_node", rule_id = %rule.id, is_shard = rule.is_shard).entered();
        ctx.check()?;

        let opts = rule.eval_options.clone();
        let (value, diagnostics, expression_pass) = self.eval_self(rule, data, &opts)?;

        let skip_children =
            opts.stop_if_parent_negative && !expression_pass && matches!(rule.result_type, ResultType::Bool);

        let acc = if skip_children || rule.rules.is_empty() {
            RollupAccumulator::new()
        } else {
            let mut children: Vec<Arc<Rule<B>>> = rule.rules.values().cloned().collect();
            if let Some(sort_func) = &opts.sort_func {
                children.sort_by(|a, b| sort_func(a, b));
            }

            let use_parallel = opts
                .parallel
                .filter(|p| children.len() >= p.min_size && p.batch_size > 0 && p.max_parallel > 0);

            match use_parallel {
                Some(p) => self.eval_children_parallel(&children, data, ctx, &opts, p)?,
                None => self.eval_children_sequential(&children, data, ctx, &opts)?,
            }
        };

        let pass = if opts.true_if_any {
            expression_pass && (rule.rules.is_empty() || acc.results.values().any(|r| r.pass))
        } else {
            expression_pass && acc.results.values().all(|r| r.pass)
        };

        Ok(EvalResult {
            rule: RuleRef {
                id: rule.id.clone(),
                is_shard: rule.is_shard,
            },
            expression_pass,
            pass,
            value,
            results: acc.results,
            diagnostics,
            eval_options: opts,
            rules_evaluated: acc.rules_evaluated,
            eval_count: 1 + acc.eval_count,
            eval_parallel_count: acc.eval_parallel_count,
        })
    }

    fn eval_children_sequential(
        &self,
        children: &[Arc<Rule<B>>],
        data: &Context<B::Value>,
        ctx: &EvalContext,
        opts: &EvalOptions<B>,
    ) -> Result<RollupAccumulator<B>, EvalError> {
        let mut acc = RollupAccumulator::new();
        for child in children {
            ctx.check()?;
            let result = self.eval_node(child, data, ctx)?;
            if acc.offer(child.id.clone(), result, opts, false) {
                break;
            }
        }
        Ok(acc)
    }

    fn eval_children_parallel(
        &self,
        children: &[Arc<Rule<B>>],
        data: &Context<B::Value>,
        ctx: &EvalContext,
        opts: &EvalOptions<B>,
        parallel: ParallelOptions,
    ) -> Result<RollupAccumulator<B>, EvalError> {
        let child_ctx = ctx.child();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallel.max_parallel)
            .build()
            .map_err(|e| EvalError::Pool(e.to_string()))?;

        let (tx, rx) = crossbeam_channel::unbounded::<Result<(String, EvalResult<B>), EvalError>>();
        let batches: Vec<&[Arc<Rule<B>>]> = children.chunks(parallel.batch_size).collect();

        pool.scope(|scope| {
            for batch in batches {
                let tx = tx.clone();
                let child_ctx = child_ctx.clone();
                scope.spawn(move |_| {
                    for child in batch {
                        if child_ctx.is_cancelled() {
                            return;
                        }
                        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            self.eval_node(child, data, &child_ctx)
                        }));
                        let message = match outcome {
                            Ok(Ok(result)) => Ok((child.id.clone(), result)),
                            Ok(Err(e)) => Err(e),
                            Err(_) => {
                                tracing::warn!(id = %child.id, "panic_in_parallel_rule");
                                Err(EvalError::PanicInParallel { id: child.id.clone() })
                            }
                        };
                        let is_err = message.is_err();
                        if tx.send(message).is_err() {
                            return;
                        }
                        if is_err {
                            child_ctx.cancel();
                            return;
                        }
                    }
                });
            }
        });
        drop(tx);

        let mut acc = RollupAccumulator::new();
        let mut first_error = None;

        for msg in rx {
            match msg {
                Ok((id, result)) => {
                    if first_error.is_some() {
                        continue;
                    }
                    if acc.offer(id, result, opts, true) {
                        child_ctx.cancel();
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    child_ctx.cancel();
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(acc)
    }
}
