// src/case/instance.rs

//! Pure core for one case instance.
//!
//! [`CaseInstance`] is synchronous and deterministic: it consumes requests
//! and returns a [`CoreStep`] describing what the IO shell must do next
//! (currently: spawn process instances). It has no channels, no Tokio types
//! and performs no IO, so every lifecycle rule can be tested directly.
//!
//! Every mutating request is validated completely before anything is
//! written, so a rejected request leaves the tree unchanged.

use tracing::{debug, info, warn};

use crate::case::bridge::{self, SpawnCommand};
use crate::case::cascade::{CascadeResolver, ReadOnlyCascade};
use crate::case::node::{ExecutionNode, ExecutionTree, NodeId, NodeKind, NodeSnapshot, NodeState};
use crate::case::scope::{self, VariableInstance, VariableMap, VariableValue};
use crate::case::transition::{Effect, Transition, TransitionOrigin, TransitionTable};
use crate::errors::{CaseError, Result};
use crate::model::{CaseDefinition, PlanItem};
use crate::types::{Activation, CaseInstanceId, ProcessHandle};

/// A single variable write, local to the addressed node or case-wide.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableWrite {
    pub name: String,
    pub value: VariableValue,
    pub local: bool,
}

/// Variable writes plus an optional transition, applied to one node as a
/// unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionCommand {
    pub node: NodeId,
    pub variables: Vec<VariableWrite>,
    pub transition: Option<Transition>,
}

impl ExecutionCommand {
    pub fn transition(node: NodeId, transition: Transition) -> Self {
        Self {
            node,
            variables: Vec::new(),
            transition: Some(transition),
        }
    }

    pub fn set_variable(
        node: NodeId,
        name: impl Into<String>,
        value: VariableValue,
        local: bool,
    ) -> Self {
        Self {
            node,
            variables: vec![VariableWrite {
                name: name.into(),
                value,
                local,
            }],
            transition: None,
        }
    }
}

/// Work the IO shell must perform after a core step.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Ask the external process engine for a process instance.
    SpawnProcess(SpawnCommand),
}

/// Result of a single mutating core step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Containers completed by the cascade in this step.
    pub cascaded: Vec<NodeId>,
    /// Descendants force-terminated in this step.
    pub terminated: Vec<NodeId>,
}

/// Owned copy of a whole case instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSnapshot {
    pub id: CaseInstanceId,
    pub definition_key: String,
    pub completed: bool,
    pub closed: bool,
    pub nodes: Vec<NodeSnapshot>,
}

impl CaseSnapshot {
    pub fn node(&self, activity_id: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.activity_id == activity_id)
    }
}

/// The root execution node plus everything below it.
#[derive(Debug, Clone)]
pub struct CaseInstance {
    id: CaseInstanceId,
    definition_key: String,
    tree: ExecutionTree,
    table: TransitionTable,
}

impl CaseInstance {
    /// Build the full tree for `definition`, write `variables` into the root
    /// scope and apply automatic activations.
    ///
    /// The returned step carries one spawn command per automatically
    /// activated process task. Containers with nothing left to wait for are
    /// completed before returning.
    pub fn instantiate(
        id: CaseInstanceId,
        definition: &CaseDefinition,
        variables: VariableMap,
        table: TransitionTable,
    ) -> (Self, CoreStep) {
        let mut tree = ExecutionTree::new();
        let root = tree.push(
            definition.key().to_string(),
            NodeKind::CaseInstanceRoot,
            NodeState::Active,
            None,
            false,
            None,
        );

        let mut stack: Vec<(NodeId, &PlanItem)> = definition
            .plan_items()
            .iter()
            .rev()
            .map(|item| (root, item))
            .collect();

        while let Some((parent, item)) = stack.pop() {
            let node = tree.push(
                item.activity_id.clone(),
                item.node_kind(),
                initial_state(item),
                Some(parent),
                item.required,
                process_key(item),
            );
            stack.extend(item.children().iter().rev().map(|child| (node, child)));
        }

        if let Some(root) = tree.get_mut(root) {
            for (name, value) in variables {
                root.scope.set(name, value);
            }
        }

        let mut step = CoreStep::default();
        for node in bridge::awaiting_spawn(&tree) {
            if let Some(cmd) = bridge::spawn_command(&tree, node) {
                step.commands.push(CoreCommand::SpawnProcess(cmd));
            }
        }
        step.cascaded = CascadeResolver::new(&mut tree).settle();

        info!(
            case = %id,
            definition = %definition.key(),
            nodes = tree.len(),
            auto_spawns = step.commands.len(),
            "case instance created"
        );

        let instance = Self {
            id,
            definition_key: definition.key().to_string(),
            tree,
            table,
        };
        (instance, step)
    }

    pub fn id(&self) -> CaseInstanceId {
        self.id
    }

    pub fn definition_key(&self) -> &str {
        &self.definition_key
    }

    pub fn tree(&self) -> &ExecutionTree {
        &self.tree
    }

    pub fn root(&self) -> Option<&ExecutionNode> {
        self.tree.root()
    }

    /// Derived: true iff the root has reached `Completed`.
    pub fn is_completed(&self) -> bool {
        self.tree
            .root()
            .is_some_and(|root| root.state == NodeState::Completed)
    }

    pub fn is_closed(&self) -> bool {
        self.tree.root().is_some_and(|root| root.closed)
    }

    pub fn node(&self, id: NodeId) -> Option<&ExecutionNode> {
        self.tree.get(id)
    }

    pub fn find_node(&self, activity_id: &str) -> Option<NodeSnapshot> {
        self.tree
            .find_by_activity(activity_id)
            .map(ExecutionNode::snapshot)
    }

    pub fn snapshot(&self) -> CaseSnapshot {
        CaseSnapshot {
            id: self.id,
            definition_key: self.definition_key.clone(),
            completed: self.is_completed(),
            closed: self.is_closed(),
            nodes: self.tree.iter().map(ExecutionNode::snapshot).collect(),
        }
    }

    /// Resolve `name` from `node` up to the root. `Ok(None)` when the
    /// variable is not defined anywhere on the chain.
    pub fn get_variable(&self, node: NodeId, name: &str) -> Result<Option<VariableValue>> {
        self.require(node)?;
        Ok(scope::resolve(&self.tree, node, name).cloned())
    }

    pub fn visible_variables(&self, node: NodeId) -> Result<VariableMap> {
        self.require(node)?;
        Ok(scope::visible(&self.tree, node))
    }

    pub fn variable_instances(&self) -> Vec<VariableInstance> {
        scope::instances(&self.tree)
    }

    /// Apply variable writes and an optional caller transition to one node.
    pub fn execute(&mut self, cmd: &ExecutionCommand) -> Result<CoreStep> {
        self.require(cmd.node)?;

        // Decide legality before touching the tree.
        let planned = match cmd.transition {
            Some(transition) => Some((
                transition,
                self.plan_transition(cmd.node, transition, TransitionOrigin::Caller)?,
            )),
            None => None,
        };

        for write in &cmd.variables {
            self.write_variable(cmd.node, write);
        }

        let mut step = CoreStep::default();
        if let Some((transition, effect)) = planned {
            self.apply(cmd.node, transition, effect, &mut step);
        }
        Ok(step)
    }

    /// Record the process instance spawned for `node`.
    pub fn record_binding(&mut self, node: NodeId, handle: ProcessHandle) {
        let id = self.id;
        match self.tree.get_mut(node) {
            Some(n)
                if n.kind == NodeKind::ProcessTask
                    && n.state == NodeState::Active
                    && n.binding.is_none() =>
            {
                info!(
                    case = %id,
                    node = %n.id,
                    activity = %n.activity_id,
                    process = %handle,
                    "process instance bound to process task"
                );
                n.binding = Some(handle);
            }
            Some(n) => {
                warn!(
                    case = %id,
                    node = %n.id,
                    state = %n.state,
                    process = %handle,
                    "spawned process cannot be bound; node is not an unbound active process task"
                );
            }
            None => warn!(case = %id, %node, "binding for unknown node; ignoring"),
        }
    }

    /// Re-issue the spawn for an active process task that has no binding,
    /// e.g. after the process engine reported `DefinitionNotFound`.
    pub fn retry_spawn(&self, node: NodeId) -> Result<CoreStep> {
        let n = self.require(node)?;
        let awaiting = n.kind == NodeKind::ProcessTask
            && n.state == NodeState::Active
            && n.binding.is_none();
        if !awaiting {
            return Err(CaseError::NotAwaitingSpawn(n.activity_id.clone()));
        }

        let mut step = CoreStep::default();
        if let Some(cmd) = bridge::spawn_command(&self.tree, node) {
            step.commands.push(CoreCommand::SpawnProcess(cmd));
        }
        Ok(step)
    }

    /// The bound process instance finished: complete its process task.
    ///
    /// Unknown handles and handles whose node is no longer active are
    /// ignored, so duplicate notifications are harmless.
    pub fn process_completed(&mut self, handle: &ProcessHandle) -> CoreStep {
        self.process_event(handle, Transition::Complete)
    }

    /// The bound process instance failed: move its process task to `Failed`.
    pub fn process_failed(&mut self, handle: &ProcessHandle, reason: &str) -> CoreStep {
        warn!(case = %self.id, process = %handle, %reason, "bound process instance failed");
        self.process_event(handle, Transition::Fail)
    }

    fn process_event(&mut self, handle: &ProcessHandle, transition: Transition) -> CoreStep {
        let mut step = CoreStep::default();

        let Some(node) = bridge::bound_node(&self.tree, handle) else {
            debug!(
                case = %self.id,
                process = %handle,
                "notification for unknown process; ignoring"
            );
            return step;
        };

        match self.plan_transition(node, transition, TransitionOrigin::ProcessEngine) {
            Ok(effect) => self.apply(node, transition, effect, &mut step),
            Err(err) => {
                debug!(
                    case = %self.id,
                    process = %handle,
                    error = %err,
                    "process notification no longer applies; ignoring"
                );
            }
        }
        step
    }

    fn require(&self, node: NodeId) -> Result<&ExecutionNode> {
        self.tree
            .get(node)
            .ok_or_else(|| CaseError::NodeNotFound(format!("{} in {}", node, self.id)))
    }

    /// Look the request up in the table and apply tree-dependent guards.
    fn plan_transition(
        &self,
        node: NodeId,
        transition: Transition,
        origin: TransitionOrigin,
    ) -> Result<Effect> {
        let n = self.require(node)?;
        let invalid = || CaseError::InvalidTransition {
            node: n.activity_id.clone(),
            kind: n.kind,
            state: n.state,
            transition,
        };

        let effect = self
            .table
            .resolve(n.kind, n.state, n.closed, transition, origin)
            .ok_or_else(invalid)?;

        // Nothing below a completed or terminated container may reopen.
        let inside_finished_container = n.parent.is_some_and(|p| {
            self.tree
                .ancestors_inclusive(p)
                .any(|a| a.state.is_terminal())
        });
        if inside_finished_container && transition != Transition::Close {
            return Err(invalid());
        }

        if transition == Transition::Complete
            && n.kind.is_container()
            && !ReadOnlyCascade::new(&self.tree).can_complete_explicitly(node)
        {
            return Err(invalid());
        }

        Ok(effect)
    }

    fn write_variable(&mut self, node: NodeId, write: &VariableWrite) {
        let target = if write.local { node } else { NodeId::ROOT };
        if let Some(n) = self.tree.get_mut(target) {
            debug!(
                case = %self.id,
                node = %target,
                name = %write.name,
                local = write.local,
                "setting variable"
            );
            n.scope.set(write.name.clone(), write.value.clone());
        }
    }

    /// Mutate the node per `effect`, then run the follow-up rules: forced
    /// termination below, spawn for started process tasks, cascade above.
    fn apply(&mut self, node: NodeId, transition: Transition, effect: Effect, step: &mut CoreStep) {
        let Some(n) = self.tree.get_mut(node) else {
            return;
        };
        let from = n.state;
        let kind = n.kind;
        n.state = effect.next;
        if effect.closes {
            n.closed = true;
        }
        if transition == Transition::Fail {
            n.binding = None;
        }

        info!(
            case = %self.id,
            node = %n.id,
            activity = %n.activity_id,
            kind = %kind,
            %transition,
            %from,
            to = %effect.next,
            "node transitioned"
        );

        let leaves_open_children = effect.next == NodeState::Terminated
            || (transition == Transition::Complete && kind.is_container());
        if leaves_open_children && from != effect.next {
            let mut resolver = CascadeResolver::new(&mut self.tree);
            step.terminated.extend(resolver.terminate_descendants(node));
        }

        if transition == Transition::ManualStart && kind == NodeKind::ProcessTask {
            if let Some(cmd) = bridge::spawn_command(&self.tree, node) {
                step.commands.push(CoreCommand::SpawnProcess(cmd));
            }
        }

        if effect.next.is_terminal() && from != effect.next {
            let mut resolver = CascadeResolver::new(&mut self.tree);
            step.cascaded.extend(resolver.propagate(node));
        }

        debug_assert!(
            self.completed_containers_are_settled(),
            "a completed container still has a non-terminal child"
        );
    }

    fn completed_containers_are_settled(&self) -> bool {
        self.tree
            .iter()
            .filter(|n| n.kind.is_container() && n.state == NodeState::Completed)
            .all(|n| {
                n.children
                    .iter()
                    .all(|&c| self.tree.get(c).is_some_and(|c| c.state.is_terminal()))
            })
    }
}

fn initial_state(item: &PlanItem) -> NodeState {
    match item.node_kind() {
        NodeKind::Stage | NodeKind::CaseInstanceRoot => NodeState::Active,
        NodeKind::Milestone => NodeState::Available,
        NodeKind::HumanTask | NodeKind::ProcessTask => match item.activation {
            Activation::Manual => NodeState::Enabled,
            Activation::Automatic => NodeState::Active,
        },
    }
}

fn process_key(item: &PlanItem) -> Option<String> {
    match &item.kind {
        crate::model::PlanItemKind::ProcessTask {
            process_definition_key,
        } => Some(process_definition_key.clone()),
        _ => None,
    }
}
