//! A concurrency-safe custodian of the rule tree: atomic, batched mutation
//! with copy-on-write snapshot semantics so readers observe an immutable
//! view.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::backend::Backend;
use crate::engine::{CompileOptions, Engine, EngineError};
use crate::rule::{Rule, RuleError};
use crate::sharder::{self, ShardError};

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Shard(#[from] ShardError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A single step of a `Vault::mutate` batch.
pub enum MutationOp<B: Backend> {
    Add { rule: Rule<B>, parent_id: String },
    Update { rule: Rule<B> },
    Delete { id: String },
    Move { id: String, new_parent_id: String },
    /// Stamp the snapshot's `LastUpdate` metadata explicitly, overriding the
    /// automatic timestamp a batch would otherwise receive.
    LastUpdate(DateTime<Utc>),
}

fn id_exists<B: Backend>(rule: &Rule<B>, id: &str) -> bool {
    rule.id == id || rule.rules.values().any(|c| id_exists(c, id))
}

/// Path of child IDs from `rule`, exclusive, down to and including the node
/// with `id == target`.
fn find_id_path<B: Backend>(rule: &Rule<B>, target: &str) -> Option<Vec<String>> {
    if rule.id == target {
        return Some(Vec::new());
    }
    for (cid, child) in &rule.rules {
        if let Some(mut sub) = find_id_path(child, target) {
            sub.insert(0, cid.clone());
            return Some(sub);
        }
    }
    None
}

/// Path of child IDs from `rule` down to (but not including) the parent of
/// `target`. An empty path means `rule` itself is the parent.
fn find_parent_id_path<B: Backend>(rule: &Rule<B>, target: &str) -> Option<Vec<String>> {
    if rule.rules.contains_key(target) {
        return Some(Vec::new());
    }
    for (cid, child) in &rule.rules {
        if let Some(mut sub) = find_parent_id_path(child, target) {
            sub.insert(0, cid.clone());
            return Some(sub);
        }
    }
    None
}

/// Walk `path`, cloning each node along the way only when
/// [`Arc::make_mut`] finds it still shared with another snapshot. Nodes
/// outside this path are never touched.
fn make_mut_path<'a, B: Backend>(rule: &'a mut Rule<B>, path: &[String]) -> &'a mut Rule<B> {
    let mut current = rule;
    for id in path {
        let child_arc = current
            .rules
            .get_mut(id)
            .expect("path computed against this tree must remain valid");
        current = Arc::make_mut(child_arc);
    }
    current
}

fn make_mut_to_id<'a, B: Backend>(rule: &'a mut Rule<B>, id: &str) -> Option<&'a mut Rule<B>> {
    let path = find_id_path(rule, id)?;
    Some(make_mut_path(rule, &path))
}

fn apply_op<B: Backend>(working: &mut Rule<B>, op: MutationOp<B>) -> Result<(), VaultError> {
    match op {
        MutationOp::Add { rule, parent_id } => {
            if rule.id.is_empty() {
                return Err(RuleError::EmptyId.into());
            }
            if id_exists(working, &rule.id) {
                return Err(RuleError::DuplicateSibling(rule.id).into());
            }
            let parent = make_mut_to_id(working, &parent_id)
                .ok_or_else(|| RuleError::MissingParent(parent_id.clone()))?;
            parent.rules.insert(rule.id.clone(), Arc::new(rule));
            Ok(())
        }
        MutationOp::Update { rule } => {
            let path =
                find_parent_id_path(working, &rule.id).ok_or_else(|| RuleError::NotFound(rule.id.clone()))?;
            let parent = make_mut_path(working, &path);
            parent.rules.insert(rule.id.clone(), Arc::new(rule));
            Ok(())
        }
        MutationOp::Delete { id } => {
            if id == working.id {
                return Err(RuleError::DeleteRoot.into());
            }
            let path = find_parent_id_path(working, &id).ok_or_else(|| RuleError::NotFound(id.clone()))?;
            let parent = make_mut_path(working, &path);
            if parent.rules.remove(&id).is_none() {
                return Err(RuleError::NotFound(id).into());
            }
            Ok(())
        }
        MutationOp::Move { id, new_parent_id } => {
            if id == new_parent_id {
                return Err(RuleError::MoveToSelf(id).into());
            }
            let path = find_id_path(working, &id).ok_or_else(|| RuleError::NotFound(id.clone()))?;
            {
                let subtree = make_mut_path(working, &path);
                if id_exists(subtree, &new_parent_id) {
                    return Err(RuleError::MoveToDescendant(id.clone(), new_parent_id.clone()).into());
                }
            }

            let old_parent_path =
                find_parent_id_path(working, &id).ok_or_else(|| RuleError::NotFound(id.clone()))?;
            let removed = {
                let old_parent = make_mut_path(working, &old_parent_path);
                old_parent
                    .rules
                    .remove(&id)
                    .ok_or_else(|| RuleError::NotFound(id.clone()))?
            };

            let new_parent = match make_mut_to_id(working, &new_parent_id) {
                Some(parent) => parent,
                None => {
                    // Re-attach under the old parent before failing so the
                    // working copy stays internally consistent; the whole
                    // batch is discarded on error regardless.
                    let old_parent = make_mut_path(working, &old_parent_path);
                    old_parent.rules.insert(id.clone(), removed);
                    return Err(RuleError::MissingParent(new_parent_id).into());
                }
            };
            new_parent.rules.insert(id.clone(), removed);
            Ok(())
        }
        MutationOp::LastUpdate(_) => unreachable!("handled by Vault::mutate before dispatch"),
    }
}

/// Owns the canonical rule tree root and executes ordered mutation batches
/// atomically under copy-on-write, serving immutable snapshots to readers.
pub struct Vault<B: Backend> {
    root: ArcSwap<Rule<B>>,
    last_update: Mutex<DateTime<Utc>>,
    engine: Engine<B>,
    writer: Mutex<()>,
}

impl<B: Backend> Vault<B> {
    /// `root_or_nil` defaults to an empty `"root"` rule when `None`. The
    /// initial tree is sharded and compiled before the vault accepts reads.
    pub fn new(engine: Engine<B>, root_or_nil: Option<Rule<B>>) -> Result<Self, VaultError> {
        let mut root = root_or_nil.unwrap_or_else(|| Rule::new("root", ""));
        sharder::build_shards(&mut root)?;
        engine.compile(&mut root, CompileOptions::default())?;

        Ok(Vault {
            root: ArcSwap::from_pointee(root),
            last_update: Mutex::new(Utc::now()),
            engine,
            writer: Mutex::new(()),
        })
    }

    /// The current snapshot. Readers treat the returned tree as immutable;
    /// a concurrent mutation produces a new snapshot without disturbing
    /// this one.
    pub fn immutable_rule(&self) -> Arc<Rule<B>> {
        self.root.load_full()
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        *self.last_update.lock()
    }

    /// Apply `ops` as a single atomic batch: clone copy-on-write along
    /// affected paths only, apply every operation in order against that
    /// clone, re-shard and recompile, then publish. Any error discards the
    /// clone without ever touching the published root.
    pub fn mutate(&self, ops: Vec<MutationOp<B>>) -> Result<(), VaultError> {
        let _span = tracing::debug_span!("vault_mutate", ops_len = ops.len()).entered();
        let _guard = self.writer.lock();
        let current = self.root.load_full();
        let mut working: Rule<B> = (*current).clone();
        let mut stamp_override = None;

        match self.mutate_working(&mut working, ops, &mut stamp_override) {
            Ok(()) => {
                self.root.store(Arc::new(working));
                *self.last_update.lock() = stamp_override.unwrap_or_else(Utc::now);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "vault_mutate_rolled_back");
                Err(e)
            }
        }
    }

    fn mutate_working(
        &self,
        working: &mut Rule<B>,
        ops: Vec<MutationOp<B>>,
        stamp_override: &mut Option<DateTime<Utc>>,
    ) -> Result<(), VaultError> {
        for op in ops {
            match op {
                MutationOp::LastUpdate(ts) => *stamp_override = Some(ts),
                other => apply_op(working, other)?,
            }
        }

        sharder::build_shards(working)?;
        self.engine.compile(working, CompileOptions::default())?;
        Ok(())
    }
}
