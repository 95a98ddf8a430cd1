use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use caseflow::errors::{CaseError, Result};
use caseflow::process::{ProcessEngine, ProcessStart, SpawnRequest};
use caseflow::types::ProcessHandle;

/// A fake process engine that:
/// - knows a set of process definition keys, extendable with `register`
/// - records every accepted spawn
/// - never runs anything; tests complete or fail the recorded processes
///   explicitly through the stored notifier.
#[derive(Clone)]
pub struct FakeProcessEngine {
    definitions: Arc<Mutex<HashSet<String>>>,
    started: Arc<Mutex<Vec<ProcessStart>>>,
    rejected: Arc<Mutex<Vec<String>>>,
}

impl FakeProcessEngine {
    pub fn new<I, S>(definitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            definitions: Arc::new(Mutex::new(definitions.into_iter().map(Into::into).collect())),
            started: Arc::new(Mutex::new(Vec::new())),
            rejected: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make `definition_key` known from now on.
    pub fn register(&self, definition_key: &str) {
        self.definitions
            .lock()
            .unwrap()
            .insert(definition_key.to_string());
    }

    /// Every process start accepted so far, in spawn order.
    pub fn starts(&self) -> Vec<ProcessStart> {
        self.started.lock().unwrap().clone()
    }

    pub fn start_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    /// The most recent start for a process task with this activity id.
    pub fn start_for(&self, activity_id: &str) -> Option<ProcessStart> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.request.activity_id == activity_id)
            .cloned()
    }

    /// Definition keys of spawns that were refused.
    pub fn rejected(&self) -> Vec<String> {
        self.rejected.lock().unwrap().clone()
    }

    /// Report completion of the process instance behind `handle`.
    pub async fn complete(&self, handle: &ProcessHandle) -> anyhow::Result<()> {
        let start = self.find(handle)?;
        start
            .request
            .notifier
            .process_completed(handle.clone())
            .await?;
        Ok(())
    }

    /// Report failure of the process instance behind `handle`.
    pub async fn fail(&self, handle: &ProcessHandle, reason: &str) -> anyhow::Result<()> {
        let start = self.find(handle)?;
        start
            .request
            .notifier
            .process_failed(handle.clone(), reason)
            .await?;
        Ok(())
    }

    fn find(&self, handle: &ProcessHandle) -> anyhow::Result<ProcessStart> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .find(|s| &s.handle == handle)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no process was started with handle {handle}"))
    }
}

impl ProcessEngine for FakeProcessEngine {
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send + '_>> {
        let definitions = Arc::clone(&self.definitions);
        let started = Arc::clone(&self.started);
        let rejected = Arc::clone(&self.rejected);

        Box::pin(async move {
            let known = definitions.lock().unwrap().contains(&request.definition_key);
            if !known {
                rejected.lock().unwrap().push(request.definition_key.clone());
                return Err(CaseError::DefinitionNotFound(request.definition_key));
            }

            let mut guard = started.lock().unwrap();
            let handle = ProcessHandle::new(format!("fake-process-{}", guard.len() + 1));
            guard.push(ProcessStart {
                handle: handle.clone(),
                request,
            });
            Ok(handle)
        })
    }

    fn knows(&self, definition_key: &str) -> bool {
        self.definitions.lock().unwrap().contains(definition_key)
    }
}
