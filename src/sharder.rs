//! Reorganises sibling rules under generated "shard" parents driven by
//! predicate functions.
//!
//! Converts a flat sibling list into a partition where each partition is
//! itself a child rule (the shard), so a shard-level boolean expression
//! gates its children at evaluation time.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::Backend;
use crate::rule::{Meta, Rule};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ShardError {
    #[error("shard template is null")]
    NilShard,
    #[error("shard ID 'default' is reserved")]
    ReservedShardId,
    #[error("shard meta is not a predicate")]
    UnsupportedMetaType,
}

/// Partitions `parent`'s direct children per `parent.shards`, if set. A
/// no-op if `parent.shards` is `None`, or if `parent`'s children are
/// already all shard nodes (idempotence). Does not look past `parent`'s
/// own direct children — callers needing the whole tree processed should
/// use [`build_shards`].
fn shard_node<B: Backend>(parent: &mut Rule<B>) -> Result<(), ShardError> {
    let Some(templates) = parent.shards.clone() else {
        return Ok(());
    };

    if !parent.rules.is_empty() && parent.rules.values().all(|c| c.is_shard) {
        return Ok(());
    }

    for tmpl in &templates {
        // `Rule` is never null in Rust; the nil-shard check exists only for
        // error-kind parity and is unreachable here.
        if tmpl.id == "default" {
            return Err(ShardError::ReservedShardId);
        }
        match &tmpl.meta {
            Some(Meta::Predicate(_)) => {}
            _ => return Err(ShardError::UnsupportedMetaType),
        }
    }

    let mut shard_nodes: Vec<Rule<B>> = templates
        .iter()
        .map(|tmpl| {
            let mut shard = tmpl.clone();
            shard.is_shard = true;
            shard.eval_options = shard.eval_options.with_stop_if_parent_negative(true);
            shard.rules = HashMap::new();
            shard
        })
        .collect();

    let mut default_shard = Rule::new("default", "true");
    default_shard.is_shard = true;
    default_shard.eval_options = default_shard.eval_options.with_stop_if_parent_negative(true);

    let old_children: Vec<Arc<Rule<B>>> = parent.rules.drain().map(|(_, v)| v).collect();

    for child in old_children {
        let mut owner = None;
        for (i, tmpl) in templates.iter().enumerate() {
            if let Some(Meta::Predicate(pred)) = &tmpl.meta {
                if pred(&child) {
                    owner = Some(i);
                    break;
                }
            }
        }
        match owner {
            Some(i) => {
                shard_nodes[i].rules.insert(child.id.clone(), child);
            }
            None => {
                default_shard.rules.insert(child.id.clone(), child);
            }
        }
    }

    for shard in shard_nodes {
        parent.rules.insert(shard.id.clone(), Arc::new(shard));
    }
    parent
        .rules
        .insert(default_shard.id.clone(), Arc::new(default_shard));

    Ok(())
}

/// Runs the sharder over `parent` and every descendant in the tree,
/// wherever a node's own `shards` field is set — not just `parent` itself.
/// A rule added anywhere in the tree with its own `Shards` set is sharded
/// by this same pass, since [`crate::vault::Vault`] re-runs this over the
/// whole working copy on every mutation.
///
/// Idempotent: a node whose children are already all shard nodes (every
/// child carries the `is_shard` marker) is recognised as already sharded
/// and left alone; recursion still continues into its children so nested
/// `shards` templates (or independently-added deep descendants) are found.
pub fn build_shards<B: Backend>(parent: &mut Rule<B>) -> Result<(), ShardError> {
    shard_node(parent)?;

    for child in parent.rules.values_mut() {
        let child_mut = Arc::make_mut(child);
        build_shards(child_mut)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_evalexpr::EvalExprBackend;

    fn contains(name: &str) -> Arc<dyn Fn(&Rule<EvalExprBackend>) -> bool + Send + Sync> {
        let name = name.to_string();
        Arc::new(move |r: &Rule<EvalExprBackend>| r.expr.contains(&name))
    }

    #[test]
    fn shards_children_by_predicate_and_adds_default() {
        let mut root = Rule::new("root", "");
        root.add(Rule::new("c1", "Central school")).unwrap();
        root.add(Rule::new("c2", "woodlawn school")).unwrap();
        root.add(Rule::new("c3", "unrelated")).unwrap();

        root.shards = Some(vec![
            Rule::new("central", "").with_meta(Meta::Predicate(contains("Central"))),
            Rule::new("woodlawn", "").with_meta(Meta::Predicate(contains("woodlawn"))),
        ]);

        build_shards(&mut root).unwrap();

        assert_eq!(root.rules.len(), 3);
        assert!(root.rules["central"].is_shard);
        assert!(root.rules["central"].rules.contains_key("c1"));
        assert!(root.rules["woodlawn"].rules.contains_key("c2"));
        assert!(root.rules["default"].rules.contains_key("c3"));
    }

    #[test]
    fn is_idempotent() {
        let mut root = Rule::new("root", "");
        root.add(Rule::new("c1", "Central school")).unwrap();
        root.shards = Some(vec![
            Rule::new("central", "").with_meta(Meta::Predicate(contains("Central"))),
        ]);

        build_shards(&mut root).unwrap();
        let after_first = root.tree();
        build_shards(&mut root).unwrap();
        let after_second = root.tree();

        assert_eq!(after_first, after_second);
    }

    #[test]
    fn rejects_reserved_shard_id() {
        let mut root = Rule::new("root", "");
        root.shards = Some(vec![Rule::new("default", "")
            .with_meta(Meta::Predicate(contains("x")))]);
        assert!(matches!(
            build_shards(&mut root),
            Err(ShardError::ReservedShardId)
        ));
    }

    #[test]
    fn shards_a_descendant_added_deep_in_the_tree() {
        let mut root = Rule::new("root", "");
        root.add(Rule::new("branch", "")).unwrap();
        {
            let branch = Arc::make_mut(root.rules.get_mut("branch").unwrap());
            branch.add(Rule::new("c1", "Central school")).unwrap();
            branch.add(Rule::new("c2", "woodlawn school")).unwrap();
            branch.shards = Some(vec![
                Rule::new("central", "").with_meta(Meta::Predicate(contains("Central"))),
                Rule::new("woodlawn", "").with_meta(Meta::Predicate(contains("woodlawn"))),
            ]);
        }

        // `root` itself has no `shards` field, but the call still reaches
        // into `branch` and shards it.
        build_shards(&mut root).unwrap();

        let branch = &root.rules["branch"];
        assert_eq!(branch.rules.len(), 3);
        assert!(branch.rules["central"].rules.contains_key("c1"));
        assert!(branch.rules["woodlawn"].rules.contains_key("c2"));
        assert!(branch.rules.contains_key("default"));
    }

    #[test]
    fn rejects_non_predicate_meta() {
        let mut root = Rule::new("root", "");
        root.shards = Some(vec![
            Rule::new("s", "").with_meta(Meta::Other(serde_json::json!("nope"))),
        ]);
        assert!(matches!(
            build_shards(&mut root),
            Err(ShardError::UnsupportedMetaType)
        ));
    }
}
