// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::case::{CaseInstance, CoreCommand, CoreStep, SpawnCommand};
use crate::errors::{CaseError, Result};
use crate::process::{CompletionNotifier, ProcessEngine, SpawnRequest};

use super::{CaseMessage, ProcessEvent};

/// Drives one case instance's core in response to [`CaseMessage`]s and
/// [`ProcessEvent`]s, and delegates process spawning to a [`ProcessEngine`].
///
/// This is a pure IO shell around `CaseInstance`, which contains all the
/// lifecycle semantics. Because the loop takes one message at a time, every
/// mutation of the instance (including the binding recorded after a spawn)
/// finishes before the next message is looked at.
pub struct CaseRuntime {
    core: CaseInstance,
    inbox: mpsc::Receiver<CaseMessage>,
    events: mpsc::UnboundedReceiver<ProcessEvent>,
    /// Cloned into every completion notifier. Held here so `events` stays
    /// open while the runtime lives.
    events_tx: mpsc::UnboundedSender<ProcessEvent>,
    process_engine: Arc<dyn ProcessEngine>,
}

impl fmt::Debug for CaseRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseRuntime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl CaseRuntime {
    pub fn new(
        core: CaseInstance,
        inbox: mpsc::Receiver<CaseMessage>,
        process_engine: Arc<dyn ProcessEngine>,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            core,
            inbox,
            events,
            events_tx,
            process_engine,
        }
    }

    pub fn core(&self) -> &CaseInstance {
        &self.core
    }

    /// Main event loop.
    ///
    /// - Consumes process events first, then `CaseMessage`s from the inbox.
    /// - Feeds them into the core.
    /// - Executes commands returned by the core (spawn process instances).
    ///
    /// Stops on `Shutdown`, once the root is closed, or when every inbox
    /// sender is gone.
    pub async fn run(mut self) {
        let case = self.core.id();
        info!(%case, "case runtime started");

        loop {
            tokio::select! {
                biased;
                Some(event) = self.events.recv() => {
                    debug!(%case, ?event, "case runtime received process event");
                    let was_completed = self.core.is_completed();
                    self.on_process_event(event).await;
                    self.note_completion(was_completed);
                }
                message = self.inbox.recv() => {
                    let Some(message) = message else {
                        info!(%case, "case inbox closed; exiting");
                        break;
                    };
                    debug!(%case, ?message, "case runtime received message");
                    if !self.handle(message).await {
                        break;
                    }
                }
            }
        }

        info!(%case, "case runtime exiting");
    }

    /// Issue the automatic spawns of a freshly created instance.
    ///
    /// Every definition key is checked with the engine before the first
    /// spawn, so an unknown key fails creation with nothing started. A spawn
    /// that fails anyway leaves the earlier ones without a case; their
    /// handles are logged.
    pub async fn start(&mut self, step: CoreStep) -> Result<()> {
        let case = self.core.id();

        for command in &step.commands {
            let CoreCommand::SpawnProcess(spawn) = command;
            if !self.process_engine.knows(&spawn.definition_key) {
                warn!(
                    %case,
                    activity = %spawn.activity_id,
                    definition = %spawn.definition_key,
                    "automatic process task refers to an unknown process definition"
                );
                return Err(CaseError::DefinitionNotFound(spawn.definition_key.clone()));
            }
        }

        if let Err(err) = self.execute_step(step).await {
            let orphaned: Vec<String> = self
                .core
                .tree()
                .iter()
                .filter_map(|n| n.binding())
                .map(ToString::to_string)
                .collect();
            if !orphaned.is_empty() {
                warn!(%case, ?orphaned, "case instance discarded after spawning process instances");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Handle a single message. Returns whether the loop should keep running.
    async fn handle(&mut self, message: CaseMessage) -> bool {
        let was_completed = self.core.is_completed();
        let case = self.core.id();

        match message {
            CaseMessage::Execute { command, reply } => {
                let result = match self.core.execute(&command) {
                    Ok(step) => self.execute_step(step).await,
                    Err(err) => Err(err),
                };
                if let Err(ref err) = result {
                    debug!(%case, node = %command.node, error = %err, "request rejected");
                }
                let _ = reply.send(result);
            }
            CaseMessage::RetrySpawn { node, reply } => {
                let result = match self.core.retry_spawn(node) {
                    Ok(step) => self.execute_step(step).await,
                    Err(err) => Err(err),
                };
                let _ = reply.send(result);
            }
            CaseMessage::Inspect(inspect) => inspect(&self.core),
            CaseMessage::Shutdown => {
                info!(%case, "shutdown requested; stopping case runtime");
                return false;
            }
        }

        self.note_completion(was_completed);
        if self.core.is_closed() {
            info!(%case, "case instance closed; stopping case runtime");
            return false;
        }
        true
    }

    async fn on_process_event(&mut self, event: ProcessEvent) {
        let step = match event {
            ProcessEvent::Completed { handle } => self.core.process_completed(&handle),
            ProcessEvent::Failed { handle, reason } => self.core.process_failed(&handle, &reason),
        };
        if let Err(err) = self.execute_step(step).await {
            warn!(case = %self.core.id(), error = %err, "follow-up of process notification failed");
        }
    }

    fn note_completion(&self, was_completed: bool) {
        if !was_completed && self.core.is_completed() {
            info!(case = %self.core.id(), "case instance completed");
        }
    }

    /// Execute the commands of a core step. Stops at the first failure and
    /// returns it; the core state already reflects the step itself.
    pub async fn execute_step(&mut self, step: CoreStep) -> Result<()> {
        if !step.cascaded.is_empty() || !step.terminated.is_empty() {
            debug!(
                case = %self.core.id(),
                cascaded = ?step.cascaded,
                terminated = ?step.terminated,
                "core step changed other nodes"
            );
        }

        for command in step.commands {
            match command {
                CoreCommand::SpawnProcess(spawn) => self.spawn_process(spawn).await?,
            }
        }
        Ok(())
    }

    async fn spawn_process(&mut self, spawn: SpawnCommand) -> Result<()> {
        let case = self.core.id();
        let request = SpawnRequest {
            definition_key: spawn.definition_key.clone(),
            variables: spawn.variables,
            case_instance_id: case,
            node: spawn.node,
            activity_id: spawn.activity_id.clone(),
            notifier: CompletionNotifier::new(case, self.events_tx.clone()),
        };

        debug!(
            %case,
            node = %spawn.node,
            activity = %spawn.activity_id,
            definition = %spawn.definition_key,
            "spawning process instance"
        );

        match self.process_engine.spawn(request).await {
            Ok(handle) => {
                self.core.record_binding(spawn.node, handle);
                Ok(())
            }
            Err(err) => {
                warn!(
                    %case,
                    node = %spawn.node,
                    activity = %spawn.activity_id,
                    definition = %spawn.definition_key,
                    error = %err,
                    "spawn failed; process task stays active without a process instance"
                );
                Err(err)
            }
        }
    }
}
