//! The Result tree produced by the evaluator, plus post-processing
//! transforms: shard collapsing and pre-order flattening.

use std::collections::HashMap;

use crate::backend::{Backend, Diagnostics};
use crate::rule::EvalOptions;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResultError {
    #[error("unshard collision: duplicate id '{0}' after hoisting")]
    UnshardCollision(String),
}

/// A lightweight back-reference to the evaluated rule. `EvalResult` never
/// borrows from the snapshot it was produced against, so it can outlive a
/// subsequent `Vault::mutate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleRef {
    pub id: String,
    pub is_shard: bool,
}

/// Pass/fail counts over a result tree's non-shard nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

pub struct EvalResult<B: Backend> {
    pub rule: RuleRef,
    /// Truth of this rule's own expression (TRUE when `Expr` is empty).
    pub expression_pass: bool,
    /// Rolled-up truth; see [`crate::evaluator`] for the rollup rules.
    pub pass: bool,
    pub value: B::Value,
    pub results: HashMap<String, EvalResult<B>>,
    pub diagnostics: Option<Diagnostics>,
    pub eval_options: EvalOptions<B>,
    /// Ordered list of evaluated rules, which may include rules not present
    /// in `results` due to discard policies.
    pub rules_evaluated: Vec<RuleRef>,
    pub eval_count: usize,
    pub eval_parallel_count: usize,
}

impl<B: Backend> Clone for EvalResult<B> {
    fn clone(&self) -> Self {
        EvalResult {
            rule: self.rule.clone(),
            expression_pass: self.expression_pass,
            pass: self.pass,
            value: self.value.clone(),
            results: self.results.clone(),
            diagnostics: self.diagnostics.clone(),
            eval_options: self.eval_options.clone(),
            rules_evaluated: self.rules_evaluated.clone(),
            eval_count: self.eval_count,
            eval_parallel_count: self.eval_parallel_count,
        }
    }
}

impl<B: Backend> std::fmt::Debug for EvalResult<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalResult")
            .field("rule", &self.rule)
            .field("expression_pass", &self.expression_pass)
            .field("pass", &self.pass)
            .field("children", &self.results.len())
            .finish()
    }
}

impl<B: Backend> EvalResult<B> {
    /// Collapse every subtree rooted at a shard node, hoisting its
    /// surviving child results into its parent's `results` map. An ID
    /// collision after hoisting is an error rather than a silent
    /// tie-break.
    pub fn unshard(self) -> Result<EvalResult<B>, ResultError> {
        let mut new_results = HashMap::with_capacity(self.results.len());

        for (id, child) in self.results {
            let child = child.unshard()?;
            if child.rule.is_shard {
                for (hoisted_id, hoisted) in child.results {
                    if new_results.contains_key(&hoisted_id) {
                        return Err(ResultError::UnshardCollision(hoisted_id));
                    }
                    new_results.insert(hoisted_id, hoisted);
                }
            } else {
                if new_results.contains_key(&id) {
                    return Err(ResultError::UnshardCollision(id));
                }
                new_results.insert(id, child);
            }
        }

        Ok(EvalResult {
            results: new_results,
            ..self
        })
    }

    /// Pre-order traversal, omitting shard nodes (but descending into
    /// them).
    pub fn flat(&self) -> Vec<&EvalResult<B>> {
        let mut out = Vec::new();
        self.flat_into(&mut out);
        out
    }

    fn flat_into<'a>(&'a self, out: &mut Vec<&'a EvalResult<B>>) {
        if !self.rule.is_shard {
            out.push(self);
        }
        let mut children: Vec<&EvalResult<B>> = self.results.values().collect();
        children.sort_by(|a, b| a.rule.id.cmp(&b.rule.id));
        for child in children {
            child.flat_into(out);
        }
    }

    pub fn summary(&self) -> Summary {
        let flat = self.flat();
        let total = flat.len();
        let passed = flat.iter().filter(|r| r.pass).count();
        Summary {
            total,
            passed,
            failed: total - passed,
        }
    }
}

impl<B: Backend> std::fmt::Display for EvalResult<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.display_into(f, 0)
    }
}

impl<B: Backend> EvalResult<B> {
    fn display_into(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        writeln!(
            f,
            "{}{} pass={} expression_pass={}",
            "  ".repeat(depth),
            self.rule.id,
            self.pass,
            self.expression_pass
        )?;
        let mut children: Vec<&EvalResult<B>> = self.results.values().collect();
        children.sort_by(|a, b| a.rule.id.cmp(&b.rule.id));
        for child in children {
            child.display_into(f, depth + 1)?;
        }
        Ok(())
    }
}
