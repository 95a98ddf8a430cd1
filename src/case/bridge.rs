// src/case/bridge.rs

//! Pure half of the process task bridge.
//!
//! The core only describes the spawn it wants ([`SpawnCommand`]); the async
//! shell (`engine::runtime`) calls the external process engine and feeds the
//! resulting handle back through `CaseInstance::record_binding`. Completion
//! notifications are matched to nodes purely by their stored binding.

use crate::case::node::{ExecutionTree, NodeId, NodeKind, NodeState};
use crate::case::scope::{self, VariableMap};
use crate::types::ProcessHandle;

/// Spawn request produced by the core when a process task becomes active.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnCommand {
    pub node: NodeId,
    pub activity_id: String,
    pub definition_key: String,
    /// Variables visible from the node at activation time (local ∪ inherited).
    pub variables: VariableMap,
}

/// Build the spawn request for `node`, or `None` if it is not a process task.
pub fn spawn_command(tree: &ExecutionTree, node: NodeId) -> Option<SpawnCommand> {
    let n = tree.get(node)?;
    if n.kind != NodeKind::ProcessTask {
        return None;
    }
    let definition_key = n.process_definition_key.clone()?;
    Some(SpawnCommand {
        node,
        activity_id: n.activity_id.clone(),
        definition_key,
        variables: scope::visible(tree, node),
    })
}

/// Active process tasks that have no bound process instance yet.
pub fn awaiting_spawn(tree: &ExecutionTree) -> Vec<NodeId> {
    tree.iter()
        .filter(|n| {
            n.kind == NodeKind::ProcessTask
                && n.state == NodeState::Active
                && n.binding.is_none()
        })
        .map(|n| n.id)
        .collect()
}

/// The node bound to `handle`, whatever its state.
pub fn bound_node(tree: &ExecutionTree, handle: &ProcessHandle) -> Option<NodeId> {
    tree.find_by_binding(handle).map(|n| n.id)
}
