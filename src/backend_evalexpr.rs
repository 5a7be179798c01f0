//! A reference [`Backend`] built on the `evalexpr` crate.
//!
//! This exists for this crate's own test suite and for callers who want a
//! working backend without writing one. It is not the production
//! expression engine the core treats as an external collaborator — any
//! type implementing [`Backend`] can replace it.

use evalexpr::{
    build_operator_tree, ContextWithMutableVariables, EvalexprError, HashMapContext, Node, Value as EeValue,
};

use crate::backend::{Backend, BackendValue, Diagnostics};
use crate::schema::{Context, ResultType, Schema};

/// Wraps `evalexpr::Value` so it can implement [`BackendValue`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvalExprValue(pub EeValue);

impl BackendValue for EvalExprValue {
    fn as_bool(&self) -> Option<bool> {
        match &self.0 {
            EeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    fn is_truthy(&self) -> bool {
        match &self.0 {
            EeValue::Boolean(b) => *b,
            EeValue::Int(i) => *i != 0,
            EeValue::Float(f) => *f != 0.0,
            EeValue::String(s) => !s.is_empty(),
            EeValue::Tuple(t) => !t.is_empty(),
            EeValue::Empty => false,
        }
    }

    fn from_bool(value: bool) -> Self {
        EvalExprValue(EeValue::Boolean(value))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvalExprBackendError {
    #[error(transparent)]
    Expr(#[from] EvalexprError),
}

/// A boolean/arithmetic expression evaluator, used as this crate's default
/// `Backend`. Evaluating the literal expression `"panic"` deliberately
/// panics, so tests can exercise the evaluator's parallel panic
/// containment without a hand-rolled mock.
#[derive(Debug, Default)]
pub struct EvalExprBackend;

impl EvalExprBackend {
    pub fn new() -> Self {
        EvalExprBackend
    }
}

impl Backend for EvalExprBackend {
    type Program = Node;
    type Value = EvalExprValue;
    type Error = EvalExprBackendError;

    fn compile(
        &self,
        expr: &str,
        _schema: &Schema,
        _result_type: &ResultType,
        _collect_diagnostics: bool,
        _dry_run: bool,
    ) -> Result<Self::Program, Self::Error> {
        Ok(build_operator_tree(expr)?)
    }

    fn evaluate(
        &self,
        data: &Context<Self::Value>,
        expr: &str,
        _schema: &Schema,
        self_value: Option<&Self::Value>,
        program: &Self::Program,
        _result_type: &ResultType,
        _return_diagnostics: bool,
    ) -> Result<(Self::Value, Option<Diagnostics>), Self::Error> {
        if expr == "panic" {
            panic!("EvalExprBackend: intentional panic for expression 'panic'");
        }

        let mut context = HashMapContext::new();
        for (name, value) in data {
            context
                .set_value(name.clone(), value.0.clone())
                .map_err(EvalExprBackendError::from)?;
        }
        if let Some(self_value) = self_value {
            context
                .set_value("self".to_string(), self_value.0.clone())
                .map_err(EvalExprBackendError::from)?;
        }

        let value = program.eval_with_context(&context)?;
        Ok((EvalExprValue(value), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_evaluates_boolean_expression() {
        let backend = EvalExprBackend::new();
        let schema = Schema::new();
        let program = backend
            .compile("1 > 0", &schema, &ResultType::Bool, false, false)
            .unwrap();
        let (value, _) = backend
            .evaluate(&Context::new(), "1 > 0", &schema, None, &program, &ResultType::Bool, false)
            .unwrap();
        assert_eq!(value.as_bool(), Some(true));
    }

    #[test]
    fn self_value_is_injected_under_reserved_key() {
        let backend = EvalExprBackend::new();
        let schema = Schema::new();
        let program = backend
            .compile("self > 5", &schema, &ResultType::Bool, false, false)
            .unwrap();
        let self_value = EvalExprValue(EeValue::Int(10));
        let (value, _) = backend
            .evaluate(
                &Context::new(),
                "self > 5",
                &schema,
                Some(&self_value),
                &program,
                &ResultType::Bool,
                false,
            )
            .unwrap();
        assert_eq!(value.as_bool(), Some(true));
    }

    #[test]
    #[should_panic(expected = "intentional panic")]
    fn panic_expression_panics() {
        let backend = EvalExprBackend::new();
        let schema = Schema::new();
        let program = backend
            .compile("panic", &schema, &ResultType::Bool, false, false)
            .unwrap();
        let _ = backend.evaluate(&Context::new(), "panic", &schema, None, &program, &ResultType::Bool, false);
    }
}
