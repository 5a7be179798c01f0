//! The expression backend adapter — the narrow interface through which the
//! core consumes an external expression compiler/evaluator.
//!
//! The backend itself (parsing and evaluating a single expression) is
//! deliberately out of scope for this crate; it is an external collaborator
//! reached through this trait. See [`crate::backend_evalexpr`] for a
//! concrete reference implementation.

use crate::schema::{Context, ResultType, Schema};

/// A compiled/evaluated value produced by a [`Backend`].
///
/// The evaluator needs to derive boolean truth from a backend value without
/// knowing its concrete representation; `BackendValue` supplies that
/// coercion.
pub trait BackendValue: Clone + Send + Sync + 'static {
    /// `Some(b)` if this value is natively boolean.
    fn as_bool(&self) -> Option<bool>;

    /// Backend-defined truthiness for non-boolean values (e.g. non-zero
    /// numbers, non-empty strings/collections).
    fn is_truthy(&self) -> bool;

    /// Construct the value used for a rule whose `Expr` is empty, which is
    /// TRUE by convention.
    fn from_bool(value: bool) -> Self;
}

/// Opaque, backend-defined structured trace (sub-expression offsets,
/// sub-values, sources). The core never inspects this; it only carries it
/// from backend to caller.
pub type Diagnostics = serde_json::Value;

/// The pluggable expression compiler/evaluator.
///
/// Implementations must make `compile` deterministic for identical inputs,
/// and `evaluate` safe to call concurrently against a shared `Program` —
/// the evaluator's bounded parallel child evaluation depends on both
/// properties.
pub trait Backend: Send + Sync + 'static {
    /// Backend-produced opaque compiled form of an expression.
    type Program: Clone + Send + Sync + 'static;

    /// Backend-produced opaque runtime value.
    type Value: BackendValue;

    /// Backend-specific compile/evaluate failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Compile `expr` against `schema`, expecting a result of `result_type`.
    ///
    /// When `dry_run` is set the caller only wants validation; the returned
    /// program, if any, need not be retained by the caller.
    fn compile(
        &self,
        expr: &str,
        schema: &Schema,
        result_type: &ResultType,
        collect_diagnostics: bool,
        dry_run: bool,
    ) -> Result<Self::Program, Self::Error>;

    /// Evaluate a previously compiled `program` against `data`.
    ///
    /// `self_value` is the rule's own opaque `Self` reference, injected by
    /// the evaluator rather than smuggled into `data` under a reserved key.
    fn evaluate(
        &self,
        data: &Context<Self::Value>,
        expr: &str,
        schema: &Schema,
        self_value: Option<&Self::Value>,
        program: &Self::Program,
        result_type: &ResultType,
        return_diagnostics: bool,
    ) -> Result<(Self::Value, Option<Diagnostics>), Self::Error>;
}
