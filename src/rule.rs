//! The rule tree data model: an immutable-by-convention node graph with
//! lookup and traversal primitives.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::Backend;
use crate::schema::{ResultType, Schema};

/// Errors raised directly against a bare rule tree (not yet owned by a
/// [`crate::vault::Vault`]).
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuleError {
    #[error("rule ID must not be empty")]
    EmptyId,
    #[error("duplicate sibling ID '{0}'")]
    DuplicateSibling(String),
    #[error("rule '{0}' not found")]
    NotFound(String),
    #[error("missing parent '{0}'")]
    MissingParent(String),
    #[error("cannot move '{0}' to itself")]
    MoveToSelf(String),
    #[error("cannot move '{0}' into its own descendant '{1}'")]
    MoveToDescendant(String, String),
    #[error("cannot delete the root rule")]
    DeleteRoot,
}

/// The sharder's predicate carrier, or an opaque user payload.
///
/// In the source this lives in a free-form `Meta` slot; here it is a sum
/// type so `Other` is a type error at the point the sharder encounters it
/// rather than a runtime reflection failure.
pub enum Meta<B: Backend> {
    Predicate(Arc<dyn Fn(&Rule<B>) -> bool + Send + Sync>),
    Other(serde_json::Value),
}

impl<B: Backend> Clone for Meta<B> {
    fn clone(&self) -> Self {
        match self {
            Meta::Predicate(f) => Meta::Predicate(Arc::clone(f)),
            Meta::Other(v) => Meta::Other(v.clone()),
        }
    }
}

/// Bounded parallel child evaluation, scoped to a single node's children.
#[derive(Debug, Clone, Copy)]
pub struct ParallelOptions {
    pub min_size: usize,
    pub batch_size: usize,
    pub max_parallel: usize,
}

/// Per-node evaluation policy.
pub struct EvalOptions<B: Backend> {
    pub return_diagnostics: bool,
    /// Skip invoking the backend entirely; the node and its subtree are
    /// walked (rollup, sort, discard/stop, parallel fan-out all still
    /// apply) but report a vacuous pass with no diagnostics, and require
    /// no compiled program.
    pub dry_run: bool,
    pub stop_if_parent_negative: bool,
    pub stop_first_positive_child: bool,
    pub stop_first_negative_child: bool,
    pub true_if_any: bool,
    pub discard_pass: bool,
    pub discard_fail: Option<usize>,
    pub sort_func: Option<Arc<dyn Fn(&Rule<B>, &Rule<B>) -> Ordering + Send + Sync>>,
    pub parallel: Option<ParallelOptions>,
}

impl<B: Backend> Clone for EvalOptions<B> {
    fn clone(&self) -> Self {
        EvalOptions {
            return_diagnostics: self.return_diagnostics,
            dry_run: self.dry_run,
            stop_if_parent_negative: self.stop_if_parent_negative,
            stop_first_positive_child: self.stop_first_positive_child,
            stop_first_negative_child: self.stop_first_negative_child,
            true_if_any: self.true_if_any,
            discard_pass: self.discard_pass,
            discard_fail: self.discard_fail,
            sort_func: self.sort_func.clone(),
            parallel: self.parallel,
        }
    }
}

impl<B: Backend> Default for EvalOptions<B> {
    fn default() -> Self {
        EvalOptions {
            return_diagnostics: false,
            dry_run: false,
            stop_if_parent_negative: false,
            stop_first_positive_child: false,
            stop_first_negative_child: false,
            true_if_any: false,
            discard_pass: false,
            discard_fail: None,
            sort_func: None,
            parallel: None,
        }
    }
}

impl<B: Backend> EvalOptions<B> {
    pub fn with_return_diagnostics(mut self, v: bool) -> Self {
        self.return_diagnostics = v;
        self
    }

    pub fn with_dry_run(mut self, v: bool) -> Self {
        self.dry_run = v;
        self
    }

    pub fn with_stop_if_parent_negative(mut self, v: bool) -> Self {
        self.stop_if_parent_negative = v;
        self
    }

    pub fn with_stop_first_positive_child(mut self, v: bool) -> Self {
        self.stop_first_positive_child = v;
        self
    }

    pub fn with_stop_first_negative_child(mut self, v: bool) -> Self {
        self.stop_first_negative_child = v;
        self
    }

    pub fn with_true_if_any(mut self, v: bool) -> Self {
        self.true_if_any = v;
        self
    }

    pub fn with_discard_pass(mut self, v: bool) -> Self {
        self.discard_pass = v;
        self
    }

    pub fn with_discard_fail(mut self, n: usize) -> Self {
        self.discard_fail = Some(n);
        self
    }

    pub fn with_sort_func<F>(mut self, f: F) -> Self
    where
        F: Fn(&Rule<B>, &Rule<B>) -> Ordering + Send + Sync + 'static,
    {
        self.sort_func = Some(Arc::new(f));
        self
    }

    pub fn with_parallel(mut self, min_size: usize, batch_size: usize, max_parallel: usize) -> Self {
        self.parallel = Some(ParallelOptions {
            min_size,
            batch_size,
            max_parallel,
        });
        self
    }
}

/// A named node holding an expression, options, and optional children and
/// shard templates.
pub struct Rule<B: Backend> {
    pub id: String,
    pub expr: String,
    pub result_type: ResultType,
    pub schema: Schema,
    /// Opaque handle injected into evaluation under the reserved `self`
    /// parameter (not stored in the data context map).
    pub self_value: Option<B::Value>,
    pub meta: Option<Meta<B>>,
    pub rules: HashMap<String, Arc<Rule<B>>>,
    /// Shard templates. Persisted (not consumed) across sharder runs so a
    /// [`crate::vault::Vault`] can re-shard after every mutation batch.
    pub shards: Option<Vec<Rule<B>>>,
    pub program: Option<B::Program>,
    pub eval_options: EvalOptions<B>,
    /// Set by the sharder on generated shard/default nodes.
    pub is_shard: bool,
}

impl<B: Backend> Clone for Rule<B> {
    fn clone(&self) -> Self {
        Rule {
            id: self.id.clone(),
            expr: self.expr.clone(),
            result_type: self.result_type.clone(),
            schema: self.schema.clone(),
            self_value: self.self_value.clone(),
            meta: self.meta.clone(),
            rules: self.rules.clone(),
            shards: self.shards.clone(),
            program: self.program.clone(),
            eval_options: self.eval_options.clone(),
            is_shard: self.is_shard,
        }
    }
}

impl<B: Backend> std::fmt::Debug for Rule<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("expr", &self.expr)
            .field("is_shard", &self.is_shard)
            .field("children", &self.rules.len())
            .finish()
    }
}

impl<B: Backend> Rule<B> {
    /// A rule with the remaining fields at their defaults: `ResultType::Any`,
    /// empty schema, no meta, no children.
    pub fn new(id: impl Into<String>, expr: impl Into<String>) -> Self {
        Rule {
            id: id.into(),
            expr: expr.into(),
            result_type: ResultType::Any,
            schema: Schema::default(),
            self_value: None,
            meta: None,
            rules: HashMap::new(),
            shards: None,
            program: None,
            eval_options: EvalOptions::default(),
            is_shard: false,
        }
    }

    pub fn with_result_type(mut self, result_type: ResultType) -> Self {
        self.result_type = result_type;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_self_value(mut self, value: B::Value) -> Self {
        self.self_value = Some(value);
        self
    }

    pub fn with_meta(mut self, meta: Meta<B>) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_eval_options(mut self, options: EvalOptions<B>) -> Self {
        self.eval_options = options;
        self
    }

    pub fn with_shards(mut self, shards: Vec<Rule<B>>) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Insert `child` under this rule. Rejects an empty ID or an ID already
    /// used by a sibling.
    pub fn add(&mut self, child: Rule<B>) -> Result<(), RuleError> {
        if child.id.is_empty() {
            return Err(RuleError::EmptyId);
        }
        if self.rules.contains_key(&child.id) {
            return Err(RuleError::DuplicateSibling(child.id));
        }
        self.rules.insert(child.id.clone(), Arc::new(child));
        Ok(())
    }

    /// Single-pass recursive search returning the rule and the chain of
    /// ancestors from the root down to (not including) it. The first match
    /// by ID wins if duplicates slip into the tree; callers must not rely
    /// on duplicate IDs existing.
    pub fn find<'a>(&'a self, id: &str) -> Option<(&'a Rule<B>, Vec<&'a Rule<B>>)> {
        let mut ancestors = Vec::new();
        self.find_inner(id, &mut ancestors)
    }

    fn find_inner<'a>(
        &'a self,
        id: &str,
        ancestors: &mut Vec<&'a Rule<B>>,
    ) -> Option<(&'a Rule<B>, Vec<&'a Rule<B>>)> {
        if self.id == id {
            return Some((self, ancestors.clone()));
        }
        ancestors.push(self);
        for child in self.rules.values() {
            if let Some(found) = child.find_inner(id, ancestors) {
                return Some(found);
            }
        }
        ancestors.pop();
        None
    }

    /// Deterministic ASCII rendering, children sorted by ID, with a `(*)`
    /// marker on shard nodes.
    pub fn tree(&self) -> String {
        let mut out = String::new();
        self.tree_into(&mut out, 0);
        out
    }

    fn tree_into(&self, out: &mut String, depth: usize) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.id);
        if self.is_shard {
            out.push_str(" (*)");
        }
        out.push('\n');

        let mut children: Vec<&Arc<Rule<B>>> = self.rules.values().collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        for child in children {
            child.tree_into(out, depth + 1);
        }
    }

    /// Run the sharder against this rule's `shards` templates. See
    /// [`crate::sharder`] for the algorithm.
    pub fn build_shards(&mut self) -> Result<(), crate::sharder::ShardError> {
        crate::sharder::build_shards(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_evalexpr::EvalExprBackend;

    fn tree() -> Rule<EvalExprBackend> {
        let mut root = Rule::new("root", "");
        root.add(Rule::new("b", "true")).unwrap();
        root.add(Rule::new("a", "true")).unwrap();
        {
            let a = Arc::make_mut(root.rules.get_mut("a").unwrap());
            a.add(Rule::new("a1", "true")).unwrap();
        }
        root
    }

    #[test]
    fn find_locates_node_and_reports_ancestor_chain() {
        let root = tree();
        let (found, ancestors) = root.find("a1").unwrap();
        assert_eq!(found.id, "a1");
        assert_eq!(
            ancestors.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["root", "a"]
        );
    }

    #[test]
    fn find_returns_none_for_missing_id() {
        let root = tree();
        assert!(root.find("nope").is_none());
    }

    #[test]
    fn tree_renders_children_sorted_by_id_with_shard_marker() {
        let mut root = tree();
        {
            let b = Arc::make_mut(root.rules.get_mut("b").unwrap());
            b.is_shard = true;
        }
        let rendered = root.tree();
        assert_eq!(rendered, "root\n  a\n    a1\n  b (*)\n");
    }

    #[test]
    fn add_rejects_empty_id_and_duplicate_sibling() {
        let mut root = Rule::new("root", "");
        assert!(matches!(
            root.add(Rule::new("", "true")),
            Err(RuleError::EmptyId)
        ));
        root.add(Rule::new("x", "true")).unwrap();
        assert!(matches!(
            root.add(Rule::new("x", "false")),
            Err(RuleError::DuplicateSibling(id)) if id == "x"
        ));
    }
}
