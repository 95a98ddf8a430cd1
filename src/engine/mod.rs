// src/engine/mod.rs

//! Orchestration engine for case instances.
//!
//! This module ties together:
//! - the pure per-instance core (`case::CaseInstance`)
//! - one inbox per case instance, drained by a [`CaseRuntime`]
//! - the external process engine backend
//! - the caller-facing [`CaseService`]
//!
//! All requests for one case instance pass through that instance's bounded
//! inbox and are applied one at a time. Process notifications use a second,
//! unbounded queue owned by the same runtime, so a process engine reporting
//! back never waits on the case. Different instances never share a queue.

use std::fmt;

use tokio::sync::oneshot;

use crate::case::{CaseInstance, ExecutionCommand, NodeId};
use crate::errors::Result;
use crate::types::ProcessHandle;

/// Read-only access to the core, run inside the runtime loop.
pub type Inspection = Box<dyn FnOnce(&CaseInstance) + Send>;

/// Messages flowing into a case instance's inbox.
pub enum CaseMessage {
    /// Variable writes and/or a caller transition on one node.
    Execute {
        command: ExecutionCommand,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Re-issue a spawn for an active process task without a binding.
    RetrySpawn {
        node: NodeId,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Query the current state of the instance.
    Inspect(Inspection),
    /// Stop the runtime loop.
    Shutdown,
}

impl fmt::Debug for CaseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseMessage::Execute { command, .. } => f
                .debug_struct("Execute")
                .field("command", command)
                .finish_non_exhaustive(),
            CaseMessage::RetrySpawn { node, .. } => f
                .debug_struct("RetrySpawn")
                .field("node", node)
                .finish_non_exhaustive(),
            CaseMessage::Inspect(_) => f.write_str("Inspect"),
            CaseMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Outcome of a bound process instance, as reported by the process engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Completed { handle: ProcessHandle },
    Failed { handle: ProcessHandle, reason: String },
}

pub mod command;
pub mod runtime;
pub mod service;

pub use command::CaseExecutionCommandBuilder;
pub use runtime::CaseRuntime;
pub use service::CaseService;
