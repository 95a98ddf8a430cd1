// src/process/channel.rs

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::{CaseError, Result};
use crate::process::backend::{ProcessEngine, SpawnRequest};
use crate::types::ProcessHandle;

/// A process instance that has been assigned a handle and must now be run
/// by whoever owns the receiving end.
#[derive(Debug, Clone)]
pub struct ProcessStart {
    pub handle: ProcessHandle,
    pub request: SpawnRequest,
}

/// Process engine adapter used when the actual engine lives elsewhere in the
/// host application.
///
/// It checks the definition key against the set of deployed process
/// definitions, assigns a handle and forwards the start over an mpsc channel.
/// The host runs the process and reports back through
/// `request.notifier`.
pub struct ChannelProcessEngine {
    definitions: HashSet<String>,
    tx: mpsc::Sender<ProcessStart>,
    counter: AtomicU64,
}

impl ChannelProcessEngine {
    pub fn new<I, S>(definitions: I, tx: mpsc::Sender<ProcessStart>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            definitions: definitions.into_iter().map(Into::into).collect(),
            tx,
            counter: AtomicU64::new(0),
        }
    }

    /// Create the adapter together with the receiving end the host drains.
    pub fn channel<I, S>(definitions: I, capacity: usize) -> (Self, mpsc::Receiver<ProcessStart>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(definitions, tx), rx)
    }
}

impl ProcessEngine for ChannelProcessEngine {
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send + '_>> {
        Box::pin(async move {
            if !self.knows(&request.definition_key) {
                warn!(
                    definition = %request.definition_key,
                    case = %request.case_instance_id,
                    "spawn requested for unknown process definition"
                );
                return Err(CaseError::DefinitionNotFound(request.definition_key));
            }

            let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
            let handle = ProcessHandle::new(format!("process-{n}"));
            debug!(
                process = %handle,
                definition = %request.definition_key,
                case = %request.case_instance_id,
                "forwarding process start to host engine"
            );

            self.tx
                .send(ProcessStart {
                    handle: handle.clone(),
                    request,
                })
                .await
                .map_err(|_| anyhow!("process engine host stopped receiving starts"))?;

            Ok(handle)
        })
    }

    fn knows(&self, definition_key: &str) -> bool {
        self.definitions.contains(definition_key)
    }
}
