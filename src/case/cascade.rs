// src/case/cascade.rs

//! Parent/child cascading after a node changes state.

use tracing::{debug, info};

use crate::case::node::{ExecutionNode, ExecutionTree, NodeId, NodeState};

/// Applies cascading transitions over a borrowed tree.
///
/// Evaluation is bounded by tree depth: parent links are acyclic because
/// every child is pushed after its parent.
pub struct CascadeResolver<'a> {
    tree: &'a mut ExecutionTree,
}

impl<'a> CascadeResolver<'a> {
    pub fn new(tree: &'a mut ExecutionTree) -> Self {
        Self { tree }
    }

    /// True when every child of `container` is done; see
    /// [`ReadOnlyCascade::all_children_done`].
    pub fn all_children_done(&self, container: NodeId) -> bool {
        ReadOnlyCascade::new(&*self.tree).all_children_done(container)
    }

    /// Walk upward from `changed`, completing every active container whose
    /// children are now all done. Returns the containers completed, from
    /// the nearest outward.
    ///
    /// Stops at the first ancestor that is not `Active`, so a completed or
    /// terminated ancestor is never touched.
    pub fn propagate(&mut self, changed: NodeId) -> Vec<NodeId> {
        let mut completed = Vec::new();
        let mut current = changed;

        loop {
            let Some(node) = self.tree.get(current) else {
                break;
            };
            if !node.state.is_terminal() {
                break;
            }
            let Some(parent) = node.parent else {
                break;
            };

            let parent_active = self
                .tree
                .get(parent)
                .is_some_and(|p| p.state == NodeState::Active);
            if !parent_active || !self.all_children_done(parent) {
                break;
            }

            if let Some(p) = self.tree.get_mut(parent) {
                p.state = NodeState::Completed;
                info!(
                    node = %p.id,
                    activity = %p.activity_id,
                    kind = %p.kind,
                    "all children done; container completed"
                );
            }
            completed.push(parent);
            current = parent;
        }

        completed
    }

    /// Force every non-terminal descendant of `id` to `Terminated`.
    ///
    /// Used when a container is terminated, closed or explicitly completed
    /// while it still has open children. Returns the nodes that changed.
    pub fn terminate_descendants(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut terminated = Vec::new();
        for desc in self.tree.descendants(id) {
            if let Some(node) = self.tree.get_mut(desc) {
                if !node.state.is_terminal() {
                    debug!(
                        node = %node.id,
                        activity = %node.activity_id,
                        from = %node.state,
                        "terminating descendant"
                    );
                    node.state = NodeState::Terminated;
                    terminated.push(desc);
                }
            }
        }
        terminated
    }

    /// Complete every active container whose children are all done,
    /// bottom-up. Run once after instantiation so that empty containers (or
    /// containers whose children all start terminal) do not hang open.
    pub fn settle(&mut self) -> Vec<NodeId> {
        let mut completed = Vec::new();
        for idx in (0..self.tree.len()).rev() {
            let id = NodeId(idx);
            let ready = self.tree.get(id).is_some_and(|n| {
                n.kind.is_container() && n.state == NodeState::Active
            }) && self.all_children_done(id);

            if ready {
                if let Some(node) = self.tree.get_mut(id) {
                    node.state = NodeState::Completed;
                    info!(
                        node = %node.id,
                        activity = %node.activity_id,
                        "container has no open children at creation; completed"
                    );
                }
                completed.push(id);
            }
        }
        completed
    }
}

/// Read-only checks over a shared tree.
///
/// Used for legality guards, which must not need mutable access.
pub struct ReadOnlyCascade<'a> {
    tree: &'a ExecutionTree,
}

impl<'a> ReadOnlyCascade<'a> {
    pub fn new(tree: &'a ExecutionTree) -> Self {
        Self { tree }
    }

    /// True when every child of `container` is done: terminal, and not a
    /// required child that was merely disabled. Vacuously true for a
    /// container without children.
    pub fn all_children_done(&self, container: NodeId) -> bool {
        self.tree.get(container).is_some_and(|node| {
            node.children
                .iter()
                .all(|&c| self.tree.get(c).is_some_and(is_done))
        })
    }

    /// Whether a container may be completed explicitly right now: no child is
    /// still running (`Active`/`Failed`) and every required child is done.
    pub fn can_complete_explicitly(&self, container: NodeId) -> bool {
        let Some(node) = self.tree.get(container) else {
            return false;
        };
        node.children.iter().all(|&child| {
            self.tree.get(child).is_some_and(|c| {
                !matches!(c.state, NodeState::Active | NodeState::Failed)
                    && (!c.required || is_done(c))
            })
        })
    }
}

/// A disabled required child can still be re-enabled and started, so it
/// keeps its container open.
fn is_done(node: &ExecutionNode) -> bool {
    node.state.is_terminal() && !(node.required && node.state == NodeState::Disabled)
}
