// src/process/backend.rs

//! Pluggable process engine abstraction.
//!
//! The case runtime talks to a `ProcessEngine` instead of a concrete engine.
//! Production code hosts the real engine behind [`ChannelProcessEngine`];
//! tests can provide their own implementation that records spawns and
//! completes them on demand.
//!
//! [`ChannelProcessEngine`]: crate::process::ChannelProcessEngine

use std::future::Future;
use std::pin::Pin;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::debug;

use crate::case::{NodeId, VariableMap};
use crate::engine::ProcessEvent;
use crate::errors::Result;
use crate::types::{CaseInstanceId, ProcessHandle};

/// Everything the process engine needs to start a process instance for a
/// process task.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub definition_key: String,
    /// Variables visible from the process task at activation time.
    pub variables: VariableMap,
    pub case_instance_id: CaseInstanceId,
    pub node: NodeId,
    pub activity_id: String,
    /// Where to report the outcome of the spawned process instance.
    pub notifier: CompletionNotifier,
}

/// Trait abstracting the external process engine.
pub trait ProcessEngine: Send + Sync {
    /// Start a process instance and return its handle without waiting for
    /// it to run.
    ///
    /// Fails with `CaseError::DefinitionNotFound` when `definition_key` is
    /// unknown.
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send + '_>>;

    /// Whether `definition_key` is deployed. Checked for every automatic
    /// spawn of a new case instance before the first one is issued.
    ///
    /// Engines that cannot answer ahead of time keep the default and report
    /// unknown keys from `spawn` instead.
    fn knows(&self, definition_key: &str) -> bool {
        let _ = definition_key;
        true
    }
}

/// Callback address for one case instance.
///
/// Sending through it enqueues a [`ProcessEvent`] for the case runtime, which
/// applies it under the same one-at-a-time discipline as caller requests.
/// The queue is unbounded: reporting never waits on the runtime, even from
/// inside `ProcessEngine::spawn`.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    case_instance_id: CaseInstanceId,
    events: mpsc::UnboundedSender<ProcessEvent>,
}

impl CompletionNotifier {
    pub(crate) fn new(
        case_instance_id: CaseInstanceId,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) -> Self {
        Self {
            case_instance_id,
            events,
        }
    }

    pub fn case_instance_id(&self) -> CaseInstanceId {
        self.case_instance_id
    }

    /// Report that the process instance behind `handle` finished.
    pub async fn process_completed(&self, handle: ProcessHandle) -> Result<()> {
        debug!(case = %self.case_instance_id, process = %handle, "delivering process completion");
        self.deliver(ProcessEvent::Completed { handle })
    }

    /// Report that the process instance behind `handle` failed.
    pub async fn process_failed(
        &self,
        handle: ProcessHandle,
        reason: impl Into<String>,
    ) -> Result<()> {
        let reason = reason.into();
        debug!(
            case = %self.case_instance_id,
            process = %handle,
            %reason,
            "delivering process failure"
        );
        self.deliver(ProcessEvent::Failed { handle, reason })
    }

    fn deliver(&self, event: ProcessEvent) -> Result<()> {
        self.events.send(event).map_err(|_| {
            anyhow!(
                "case instance {} is no longer running; notification dropped",
                self.case_instance_id
            )
        })?;
        Ok(())
    }
}
