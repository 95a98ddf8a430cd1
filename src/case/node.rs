// src/case/node.rs

//! Execution nodes and the arena that owns them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::case::scope::VariableScope;
use crate::types::ProcessHandle;

/// Index of a node inside its case instance's [`ExecutionTree`].
///
/// Stable for the lifetime of the instance: nodes are never removed, a node
/// that is "gone" is one in a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The case instance root is always the first node built.
    pub const ROOT: NodeId = NodeId(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// What a node represents in the case model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Stage,
    HumanTask,
    ProcessTask,
    Milestone,
    #[serde(rename = "case_instance")]
    CaseInstanceRoot,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::CaseInstanceRoot,
        NodeKind::Stage,
        NodeKind::HumanTask,
        NodeKind::ProcessTask,
        NodeKind::Milestone,
    ];

    /// Stages and the root hold children and complete through the cascade.
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Stage | NodeKind::CaseInstanceRoot)
    }

    pub fn is_task(self) -> bool {
        matches!(self, NodeKind::HumanTask | NodeKind::ProcessTask)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Stage => "stage",
            NodeKind::HumanTask => "human task",
            NodeKind::ProcessTask => "process task",
            NodeKind::Milestone => "milestone",
            NodeKind::CaseInstanceRoot => "case instance",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Available,
    Enabled,
    Disabled,
    Active,
    Completed,
    Terminated,
    Failed,
}

impl NodeState {
    pub const ALL: [NodeState; 7] = [
        NodeState::Available,
        NodeState::Enabled,
        NodeState::Disabled,
        NodeState::Active,
        NodeState::Completed,
        NodeState::Terminated,
        NodeState::Failed,
    ];

    /// Terminal-class states for cascade purposes. `Disabled` counts: a
    /// never-activated task that was disabled no longer holds its parent
    /// open. `Failed` does not.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Completed | NodeState::Terminated | NodeState::Disabled
        )
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Available => "available",
            NodeState::Enabled => "enabled",
            NodeState::Disabled => "disabled",
            NodeState::Active => "active",
            NodeState::Completed => "completed",
            NodeState::Terminated => "terminated",
            NodeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One stage, task or milestone instance within a case instance.
#[derive(Debug, Clone)]
pub struct ExecutionNode {
    pub(crate) id: NodeId,
    pub(crate) activity_id: String,
    pub(crate) kind: NodeKind,
    pub(crate) state: NodeState,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) scope: VariableScope,
    pub(crate) required: bool,
    pub(crate) process_definition_key: Option<String>,
    /// Present only on process tasks, and only after a successful spawn.
    pub(crate) binding: Option<ProcessHandle>,
    pub(crate) closed: bool,
}

impl ExecutionNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn scope(&self) -> &VariableScope {
        &self.scope
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn binding(&self) -> Option<&ProcessHandle> {
        self.binding.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            activity_id: self.activity_id.clone(),
            kind: self.kind,
            state: self.state,
            parent: self.parent,
            children: self.children.clone(),
            local_variables: self.scope.to_map(),
            binding: self.binding.clone(),
            closed: self.closed,
        }
    }
}

/// Owned, read-only copy of a node handed out to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub activity_id: String,
    pub kind: NodeKind,
    pub state: NodeState,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub local_variables: crate::case::scope::VariableMap,
    pub binding: Option<ProcessHandle>,
    pub closed: bool,
}

impl NodeSnapshot {
    pub fn is_enabled(&self) -> bool {
        self.state == NodeState::Enabled
    }

    pub fn is_active(&self) -> bool {
        self.state == NodeState::Active
    }

    pub fn is_disabled(&self) -> bool {
        self.state == NodeState::Disabled
    }

    pub fn is_completed(&self) -> bool {
        self.state == NodeState::Completed
    }
}

/// Arena owning every node of one case instance.
///
/// Children are owned top-down through the arena; `parent` is a plain index
/// used for upward cascade and scope lookups, so there are no reference
/// cycles to manage. Nodes are pushed in pre-order, so a child's index is
/// always greater than its parent's.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTree {
    nodes: Vec<ExecutionNode>,
}

impl ExecutionTree {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Append a node under `parent` (or as the root when `parent` is `None`)
    /// and return its id.
    pub(crate) fn push(
        &mut self,
        activity_id: String,
        kind: NodeKind,
        state: NodeState,
        parent: Option<NodeId>,
        required: bool,
        process_definition_key: Option<String>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ExecutionNode {
            id,
            activity_id,
            kind,
            state,
            parent,
            children: Vec::new(),
            scope: VariableScope::default(),
            required,
            process_definition_key,
            binding: None,
            closed: false,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&ExecutionNode> {
        self.nodes.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut ExecutionNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn root(&self) -> Option<&ExecutionNode> {
        self.nodes.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionNode> {
        self.nodes.iter()
    }

    /// The node itself followed by each ancestor up to the root.
    pub fn ancestors_inclusive(&self, id: NodeId) -> impl Iterator<Item = &ExecutionNode> {
        let mut next = self.get(id);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.parent.and_then(|p| self.get(p));
            Some(current)
        })
    }

    /// All descendants of `id` in pre-order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.get(id) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(node) = self.get(next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn find_by_activity(&self, activity_id: &str) -> Option<&ExecutionNode> {
        self.nodes.iter().find(|n| n.activity_id == activity_id)
    }

    pub fn find_by_binding(&self, handle: &ProcessHandle) -> Option<&ExecutionNode> {
        self.nodes
            .iter()
            .find(|n| n.binding.as_ref() == Some(handle))
    }
}
