//! Walks the rule tree, compiling every node's expression through the
//! configured [`Backend`] and attaching the resulting program handle.

use std::sync::Arc;

use crate::backend::Backend;
use crate::rule::Rule;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub collect_diagnostics: bool,
    pub dry_run: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("compile error at {}: {message}", path.join("/"))]
    Compile { path: Vec<String>, message: String },
}

/// Compiles a rule tree against a pluggable [`Backend`].
pub struct Engine<B: Backend> {
    backend: Arc<B>,
}

impl<B: Backend> Clone for Engine<B> {
    fn clone(&self) -> Self {
        Engine {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> Engine<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Engine { backend }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Recurse the whole subtree (including shard templates), compiling
    /// every non-empty `Expr`. The first failure aborts the batch; the
    /// error is annotated with the ancestor chain down to the failing
    /// rule.
    pub fn compile(&self, root: &mut Rule<B>, options: CompileOptions) -> Result<(), EngineError> {
        let _span = tracing::debug_span!("compile", root_id = %root.id, dry_run = options.dry_run).entered();
        let mut path = Vec::new();
        let result = self.compile_node(root, options, &mut path);
        if let Err(e) = &result {
            tracing::warn!(root_id = %root.id, error = %e, "compile_failed");
        }
        result
    }

    fn compile_node(
        &self,
        rule: &mut Rule<B>,
        options: CompileOptions,
        path: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        path.push(rule.id.clone());

        if !rule.expr.is_empty() {
            let program = self
                .backend
                .compile(
                    &rule.expr,
                    &rule.schema,
                    &rule.result_type,
                    options.collect_diagnostics,
                    options.dry_run,
                )
                .map_err(|e| EngineError::Compile {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            if !options.dry_run {
                rule.program = Some(program);
            }
        }

        for child in rule.rules.values_mut() {
            let child_mut = Arc::make_mut(child);
            self.compile_node(child_mut, options, path)?;
        }

        if let Some(shards) = rule.shards.as_mut() {
            for shard in shards.iter_mut() {
                self.compile_node(shard, options, path)?;
            }
        }

        path.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_evalexpr::EvalExprBackend;
    use crate::schema::ResultType;

    #[test]
    fn compiles_whole_tree() {
        let engine = Engine::new(Arc::new(EvalExprBackend::new()));
        let mut root = Rule::new("root", "");
        root.add(Rule::new("a", "1 > 0").with_result_type(ResultType::Bool))
            .unwrap();
        engine.compile(&mut root, CompileOptions::default()).unwrap();
        assert!(root.rules["a"].program.is_some());
    }

    #[test]
    fn compile_error_reports_path() {
        let engine = Engine::new(Arc::new(EvalExprBackend::new()));
        let mut root = Rule::new("root", "");
        root.add(Rule::new("bad", "1 +")).unwrap();
        let err = engine.compile(&mut root, CompileOptions::default()).unwrap_err();
        let EngineError::Compile { path, .. } = err;
        assert_eq!(path, vec!["root".to_string(), "bad".to_string()]);
    }
}
