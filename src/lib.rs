//! # RuleVault
//!
//! A hierarchical rule-evaluation engine: a tree of rules, each an
//! expression against a pluggable [`Backend`], rolled up into a single
//! pass/fail verdict with bounded parallel fan-out, cooperative
//! cancellation, predicate-driven sharding, and concurrency-safe snapshot
//! publishing.
//!
//! ## Pipeline
//!
//! ```text
//! Rule tree (authoring time)
//!     ↓
//! [Sharder]                → partitions siblings under generated shard nodes
//!     ↓
//! [Engine::compile]        → Backend::compile per node → Program handles
//!     ↓
//! [Vault]                  → owns the compiled tree, publishes snapshots
//!     ↓
//! [Evaluator::eval]        → Backend::evaluate per node, bottom-up rollup
//!     ↓
//! EvalResult tree           → unshard / flatten / summarize
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rulevault::{Engine, Evaluator, Rule, Vault};
//! use rulevault::backend_evalexpr::EvalExprBackend;
//! use std::sync::Arc;
//!
//! let backend = Arc::new(EvalExprBackend::new());
//! let engine = Engine::new(Arc::clone(&backend));
//!
//! let mut root = Rule::new("root", "");
//! root.add(Rule::new("over_18", "age >= 18"))?;
//!
//! let vault = Vault::new(engine, Some(root))?;
//!
//! let evaluator = Evaluator::new(backend);
//! let data = [("age".to_string(), /* ... */)].into_iter().collect();
//! let result = evaluator.eval(&vault.immutable_rule(), &data, Default::default())?;
//! println!("{}", result.summary().passed);
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `schema` | Field/result typing shared across rules |
//! | `backend` | The `Backend`/`BackendValue` traits rules evaluate against |
//! | `backend_evalexpr` | Reference `Backend` built on `evalexpr` (feature `evalexpr-backend`) |
//! | `rule` | The rule tree data model and per-node evaluation options |
//! | `sharder` | Predicate-driven partitioning of sibling rules |
//! | `engine` | Compiles a rule tree's expressions through a `Backend` |
//! | `cancel` | Hierarchical cooperative cancellation and deadlines |
//! | `evaluator` | Bottom-up rollup evaluation, sequential and bounded-parallel |
//! | `result` | The `EvalResult` tree and its post-processing transforms |
//! | `vault` | Atomic, copy-on-write custodian of the rule tree |
//! | `config` | Layered configuration (file + environment) |

pub mod backend;
#[cfg(feature = "evalexpr-backend")]
pub mod backend_evalexpr;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod evaluator;
pub mod result;
pub mod rule;
pub mod schema;
pub mod sharder;
pub mod vault;

pub use backend::{Backend, BackendValue, Diagnostics};
pub use cancel::{CancelHandle, CancelledError, EvalContext};
pub use config::Config;
pub use engine::{CompileOptions, Engine, EngineError};
pub use evaluator::{EvalError, Evaluator};
pub use result::{EvalResult, ResultError, RuleRef, Summary};
pub use rule::{EvalOptions, Meta, ParallelOptions, Rule, RuleError};
pub use schema::{Context, Field, ResultType, Schema};
pub use sharder::{build_shards, ShardError};
pub use vault::{MutationOp, Vault, VaultError};
