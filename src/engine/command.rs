// src/engine/command.rs

use crate::case::{ExecutionCommand, NodeId, Transition, VariableMap, VariableValue, VariableWrite};
use crate::errors::Result;
use crate::types::CaseInstanceId;

use super::service::CaseService;

/// Collects variable writes for one node and submits them, optionally
/// together with a transition, as a single request.
///
/// The whole command is applied in one step of the case runtime. If the
/// transition is rejected none of the collected variables are written.
///
/// ```ignore
/// service
///     .with_case_execution(case, task)
///     .set_variable("approved", true)
///     .set_variable_local("comment", "looks fine")
///     .complete()
///     .await?;
/// ```
#[must_use = "the command does nothing until a transition or `execute` is awaited"]
pub struct CaseExecutionCommandBuilder<'a> {
    service: &'a CaseService,
    case: CaseInstanceId,
    node: NodeId,
    variables: Vec<VariableWrite>,
}

impl<'a> CaseExecutionCommandBuilder<'a> {
    pub(crate) fn new(service: &'a CaseService, case: CaseInstanceId, node: NodeId) -> Self {
        Self {
            service,
            case,
            node,
            variables: Vec::new(),
        }
    }

    /// Case-wide write: lands in the root scope.
    pub fn set_variable(self, name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.push(name.into(), value.into(), false)
    }

    /// Write into the addressed node's own scope.
    pub fn set_variable_local(
        self,
        name: impl Into<String>,
        value: impl Into<VariableValue>,
    ) -> Self {
        self.push(name.into(), value.into(), true)
    }

    pub fn set_variables(self, variables: VariableMap) -> Self {
        variables
            .into_iter()
            .fold(self, |b, (name, value)| b.push(name, value, false))
    }

    pub fn set_variables_local(self, variables: VariableMap) -> Self {
        variables
            .into_iter()
            .fold(self, |b, (name, value)| b.push(name, value, true))
    }

    pub async fn manual_start(self) -> Result<()> {
        self.submit(Some(Transition::ManualStart)).await
    }

    pub async fn disable(self) -> Result<()> {
        self.submit(Some(Transition::Disable)).await
    }

    pub async fn reenable(self) -> Result<()> {
        self.submit(Some(Transition::Reenable)).await
    }

    pub async fn complete(self) -> Result<()> {
        self.submit(Some(Transition::Complete)).await
    }

    pub async fn terminate(self) -> Result<()> {
        self.submit(Some(Transition::Terminate)).await
    }

    pub async fn close(self) -> Result<()> {
        self.submit(Some(Transition::Close)).await
    }

    /// Variables only, no transition.
    pub async fn execute(self) -> Result<()> {
        self.submit(None).await
    }

    fn push(mut self, name: String, value: VariableValue, local: bool) -> Self {
        self.variables.push(VariableWrite { name, value, local });
        self
    }

    async fn submit(self, transition: Option<Transition>) -> Result<()> {
        let command = ExecutionCommand {
            node: self.node,
            variables: self.variables,
            transition,
        };
        self.service.execute(self.case, command).await
    }
}
