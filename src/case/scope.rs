// src/case/scope.rs

//! Variable scopes and ancestor-chain resolution.

use std::collections::BTreeMap;

use crate::case::node::{ExecutionTree, NodeId};

pub type VariableValue = serde_json::Value;
pub type VariableMap = BTreeMap<String, VariableValue>;

/// Name → value mapping owned by one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableScope {
    vars: VariableMap,
}

impl VariableScope {
    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: VariableValue) {
        self.vars.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariableValue)> {
        self.vars.iter()
    }

    pub fn to_map(&self) -> VariableMap {
        self.vars.clone()
    }
}

/// A variable stored in some node's scope, as listed by
/// `CaseInstance::variable_instances`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInstance {
    /// Node whose scope holds the variable.
    pub node: NodeId,
    pub activity_id: String,
    pub name: String,
    pub value: VariableValue,
}

/// Resolve `name` from `from`: the node's own scope first, then each
/// ancestor up to the root.
pub fn resolve<'a>(tree: &'a ExecutionTree, from: NodeId, name: &str) -> Option<&'a VariableValue> {
    tree.ancestors_inclusive(from)
        .find_map(|node| node.scope.get(name))
}

/// Every variable visible from `from`. A name defined on several levels
/// takes the value of the nearest scope.
pub fn visible(tree: &ExecutionTree, from: NodeId) -> VariableMap {
    let chain: Vec<_> = tree.ancestors_inclusive(from).collect();
    let mut out = VariableMap::new();
    // Root first so nearer scopes overwrite.
    for node in chain.into_iter().rev() {
        for (name, value) in node.scope.iter() {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}

/// Every variable stored anywhere in the tree, in node order.
pub fn instances(tree: &ExecutionTree) -> Vec<VariableInstance> {
    tree.iter()
        .flat_map(|node| {
            node.scope.iter().map(move |(name, value)| VariableInstance {
                node: node.id,
                activity_id: node.activity_id.clone(),
                name: name.clone(),
                value: value.clone(),
            })
        })
        .collect()
}
