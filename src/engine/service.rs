// src/engine/service.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::case::{
    CaseInstance, CaseSnapshot, ExecutionCommand, NodeId, NodeSnapshot, Transition,
    TransitionTable, VariableInstance, VariableMap, VariableValue,
};
use crate::config::EngineConfig;
use crate::errors::{CaseError, Result};
use crate::model::CaseDefinition;
use crate::process::ProcessEngine;
use crate::types::CaseInstanceId;

use super::command::CaseExecutionCommandBuilder;
use super::runtime::CaseRuntime;
use super::CaseMessage;

/// Caller-facing entry point: deploys case definitions, creates case
/// instances and routes every request to the owning instance's inbox.
///
/// Lock guards are only held long enough to clone an inbox sender; no guard
/// lives across an `.await` on a case runtime.
pub struct CaseService {
    table: TransitionTable,
    inbox_capacity: usize,
    process_engine: Arc<dyn ProcessEngine>,
    definitions: RwLock<HashMap<String, Arc<CaseDefinition>>>,
    instances: RwLock<HashMap<CaseInstanceId, mpsc::Sender<CaseMessage>>>,
    next_id: AtomicU64,
}

impl CaseService {
    pub fn new(config: &EngineConfig, process_engine: Arc<dyn ProcessEngine>) -> Self {
        Self {
            table: config.transition_table(),
            inbox_capacity: config.inbox_capacity,
            process_engine,
            definitions: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn transition_table(&self) -> &TransitionTable {
        &self.table
    }

    /// Make a case definition available for instantiation. Deploying the
    /// same key again replaces the definition for future instances only.
    pub async fn deploy(&self, definition: CaseDefinition) {
        let key = definition.key().to_string();
        info!(
            definition = %key,
            plan_items = definition.plan_items().len(),
            "case definition deployed"
        );
        self.definitions
            .write()
            .await
            .insert(key, Arc::new(definition));
    }

    /// Instantiate a deployed case definition.
    ///
    /// Spawns required by automatic activation are issued before the
    /// instance is registered. Their definition keys are all checked first;
    /// if one is unknown or a spawn fails, the error is returned and the
    /// instance is discarded.
    pub async fn create_case_instance(
        &self,
        definition_key: &str,
        variables: VariableMap,
    ) -> Result<CaseInstanceId> {
        let definition = self
            .definitions
            .read()
            .await
            .get(definition_key)
            .cloned()
            .ok_or_else(|| CaseError::CaseDefinitionNotFound(definition_key.to_string()))?;

        let id = CaseInstanceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (core, step) =
            CaseInstance::instantiate(id, &definition, variables, self.table.clone());

        let (tx, rx) = mpsc::channel(self.inbox_capacity);
        let mut runtime = CaseRuntime::new(core, rx, Arc::clone(&self.process_engine));

        if let Err(err) = runtime.start(step).await {
            warn!(
                case = %id,
                definition = %definition_key,
                error = %err,
                "case instance creation failed"
            );
            return Err(err);
        }

        self.instances.write().await.insert(id, tx);
        tokio::spawn(runtime.run());

        Ok(id)
    }

    /// Apply a caller transition to one node.
    pub async fn transition(
        &self,
        case: CaseInstanceId,
        node: NodeId,
        transition: Transition,
    ) -> Result<()> {
        self.execute(case, ExecutionCommand::transition(node, transition))
            .await
    }

    pub async fn set_variable(
        &self,
        case: CaseInstanceId,
        node: NodeId,
        name: &str,
        value: impl Into<VariableValue>,
        local: bool,
    ) -> Result<()> {
        self.execute(
            case,
            ExecutionCommand::set_variable(node, name, value.into(), local),
        )
        .await
    }

    /// Start a combined command against `node`; see
    /// [`CaseExecutionCommandBuilder`].
    pub fn with_case_execution(
        &self,
        case: CaseInstanceId,
        node: NodeId,
    ) -> CaseExecutionCommandBuilder<'_> {
        CaseExecutionCommandBuilder::new(self, case, node)
    }

    /// Send a prepared command to the case runtime and wait for its outcome.
    ///
    /// Closing the root stops the runtime, and the instance is forgotten.
    pub async fn execute(&self, case: CaseInstanceId, command: ExecutionCommand) -> Result<()> {
        let closes_case =
            command.node == NodeId::ROOT && command.transition == Some(Transition::Close);

        let (reply, rx) = oneshot::channel();
        self.send(case, CaseMessage::Execute { command, reply })
            .await?;
        rx.await
            .map_err(|_| anyhow!("case runtime {case} dropped the request"))??;

        if closes_case {
            self.instances.write().await.remove(&case);
            info!(%case, "case instance closed and unregistered");
        }
        Ok(())
    }

    /// Re-issue the spawn for an active process task left without a process
    /// instance.
    pub async fn retry_spawn(&self, case: CaseInstanceId, node: NodeId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(case, CaseMessage::RetrySpawn { node, reply })
            .await?;
        rx.await
            .map_err(|_| anyhow!("case runtime {case} dropped the request"))?
    }

    /// Look a node up by activity id.
    pub async fn query_node(
        &self,
        case: CaseInstanceId,
        activity_id: &str,
    ) -> Result<NodeSnapshot> {
        let activity = activity_id.to_string();
        let found = self
            .inspect(case, move |core| core.find_node(&activity))
            .await?;
        found.ok_or_else(|| CaseError::NodeNotFound(activity_id.to_string()))
    }

    pub async fn is_completed(&self, case: CaseInstanceId) -> Result<bool> {
        self.inspect(case, |core| core.is_completed()).await
    }

    pub async fn snapshot(&self, case: CaseInstanceId) -> Result<CaseSnapshot> {
        self.inspect(case, |core| core.snapshot()).await
    }

    pub async fn get_variable(
        &self,
        case: CaseInstanceId,
        node: NodeId,
        name: &str,
    ) -> Result<Option<VariableValue>> {
        let name = name.to_string();
        self.inspect(case, move |core| core.get_variable(node, &name))
            .await?
    }

    pub async fn visible_variables(
        &self,
        case: CaseInstanceId,
        node: NodeId,
    ) -> Result<VariableMap> {
        self.inspect(case, move |core| core.visible_variables(node))
            .await?
    }

    pub async fn variable_instances(
        &self,
        case: CaseInstanceId,
    ) -> Result<Vec<VariableInstance>> {
        self.inspect(case, |core| core.variable_instances()).await
    }

    pub async fn case_instance_ids(&self) -> Vec<CaseInstanceId> {
        let mut ids: Vec<_> = self.instances.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Stop the runtime of one case instance and forget it.
    pub async fn shutdown(&self, case: CaseInstanceId) -> Result<()> {
        let tx = self
            .instances
            .write()
            .await
            .remove(&case)
            .ok_or(CaseError::CaseInstanceNotFound(case))?;

        info!(%case, "shutting down case instance");
        if tx.send(CaseMessage::Shutdown).await.is_err() {
            debug!(%case, "case runtime already stopped");
        }
        Ok(())
    }

    async fn address(&self, case: CaseInstanceId) -> Result<mpsc::Sender<CaseMessage>> {
        self.instances
            .read()
            .await
            .get(&case)
            .cloned()
            .ok_or(CaseError::CaseInstanceNotFound(case))
    }

    async fn send(&self, case: CaseInstanceId, message: CaseMessage) -> Result<()> {
        let tx = self.address(case).await?;
        tx.send(message)
            .await
            .map_err(|_| anyhow!("case runtime {case} is not running"))?;
        Ok(())
    }

    /// Run `f` against the core inside the runtime loop, so the read is
    /// ordered with every other request to the same instance.
    async fn inspect<T, F>(&self, case: CaseInstanceId, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&CaseInstance) -> T + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.send(
            case,
            CaseMessage::Inspect(Box::new(move |core| {
                let _ = reply.send(f(core));
            })),
        )
        .await?;
        Ok(rx
            .await
            .map_err(|_| anyhow!("case runtime {case} dropped the query"))?)
    }
}
