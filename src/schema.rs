//! Result types and the data-shape descriptor handed to a [`Backend`](crate::backend::Backend)
//! at compile time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The expected result type of a rule's expression, from a closed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultType {
    Bool,
    Int,
    Float,
    String,
    Duration,
    Timestamp,
    List(Box<ResultType>),
    Map(Box<ResultType>, Box<ResultType>),
    Proto(String),
    Any,
}

impl Default for ResultType {
    fn default() -> Self {
        ResultType::Any
    }
}

/// A single field's declared type within a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub result_type: ResultType,
}

/// Data-shape descriptor handed to the backend at compile time.
///
/// A rule's `Schema` lists the variables its expression may reference. The
/// core does not interpret field types itself — it passes `Schema` through
/// to the backend unmodified, the way the expression backend is the only
/// party that knows how to validate or use it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, result_type: ResultType) -> Self {
        self.fields.push(Field {
            name: name.into(),
            result_type,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A mapping from variable name to opaque backend value, as handed to
/// [`Backend::evaluate`](crate::backend::Backend::evaluate). The reserved
/// key `"self"` is never stored here — `Rule::self_value` is passed to the
/// backend through its own dedicated parameter instead.
pub type Context<V> = HashMap<String, V>;
