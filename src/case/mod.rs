// src/case/mod.rs

//! Hierarchical execution state machine for case instances.
//!
//! - [`node`] holds execution nodes and the arena that owns them.
//! - [`scope`] implements local / case-wide variables and ancestor lookup.
//! - [`transition`] is the legality table, keyed by node kind.
//! - [`cascade`] completes or terminates containers as children change.
//! - [`bridge`] describes process spawns and matches completion handles.
//! - [`instance`] ties these together into the pure per-instance core.

pub mod bridge;
pub mod cascade;
pub mod instance;
pub mod node;
pub mod scope;
pub mod transition;

pub use bridge::SpawnCommand;
pub use instance::{
    CaseInstance, CaseSnapshot, CoreCommand, CoreStep, ExecutionCommand, VariableWrite,
};
pub use node::{ExecutionNode, ExecutionTree, NodeId, NodeKind, NodeSnapshot, NodeState};
pub use scope::{VariableInstance, VariableMap, VariableScope, VariableValue};
pub use transition::{
    ClosePolicy, CloseRule, Effect, Transition, TransitionOrigin, TransitionTable,
};
