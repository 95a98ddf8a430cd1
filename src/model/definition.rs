// src/model/definition.rs

use std::collections::HashSet;

use crate::case::NodeKind;
use crate::errors::{CaseError, Result};
use crate::types::Activation;

/// What a plan item is, plus the data only that kind carries.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanItemKind {
    Stage { children: Vec<PlanItem> },
    HumanTask,
    ProcessTask { process_definition_key: String },
    Milestone,
}

/// One item of a case plan: the static description an execution node is
/// instantiated from.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanItem {
    pub activity_id: String,
    pub kind: PlanItemKind,
    pub activation: Activation,
    /// A required item that is still open blocks explicit completion of the
    /// case instance.
    pub required: bool,
}

impl PlanItem {
    pub fn human_task(activity_id: impl Into<String>) -> Self {
        Self::new(activity_id, PlanItemKind::HumanTask)
    }

    pub fn process_task(
        activity_id: impl Into<String>,
        process_definition_key: impl Into<String>,
    ) -> Self {
        Self::new(
            activity_id,
            PlanItemKind::ProcessTask {
                process_definition_key: process_definition_key.into(),
            },
        )
    }

    pub fn milestone(activity_id: impl Into<String>) -> Self {
        Self::new(activity_id, PlanItemKind::Milestone)
    }

    pub fn stage(activity_id: impl Into<String>, children: Vec<PlanItem>) -> Self {
        Self::new(activity_id, PlanItemKind::Stage { children })
    }

    fn new(activity_id: impl Into<String>, kind: PlanItemKind) -> Self {
        Self {
            activity_id: activity_id.into(),
            kind,
            activation: Activation::Manual,
            required: false,
        }
    }

    /// Start the task `Active` when the case instance is created.
    pub fn automatic(mut self) -> Self {
        self.activation = Activation::Automatic;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn node_kind(&self) -> NodeKind {
        match self.kind {
            PlanItemKind::Stage { .. } => NodeKind::Stage,
            PlanItemKind::HumanTask => NodeKind::HumanTask,
            PlanItemKind::ProcessTask { .. } => NodeKind::ProcessTask,
            PlanItemKind::Milestone => NodeKind::Milestone,
        }
    }

    pub fn children(&self) -> &[PlanItem] {
        match &self.kind {
            PlanItemKind::Stage { children } => children,
            _ => &[],
        }
    }
}

/// A validated, already-materialized case model.
///
/// The root execution node of every instance uses the definition `key` as
/// its activity id.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseDefinition {
    key: String,
    plan_items: Vec<PlanItem>,
}

impl CaseDefinition {
    pub fn builder(key: impl Into<String>) -> CaseDefinitionBuilder {
        CaseDefinitionBuilder {
            key: key.into(),
            plan_items: Vec::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn plan_items(&self) -> &[PlanItem] {
        &self.plan_items
    }
}

/// Builder for [`CaseDefinition`]; `build` runs validation.
#[derive(Debug, Clone)]
pub struct CaseDefinitionBuilder {
    key: String,
    plan_items: Vec<PlanItem>,
}

impl CaseDefinitionBuilder {
    pub fn plan_item(mut self, item: PlanItem) -> Self {
        self.plan_items.push(item);
        self
    }

    pub fn human_task(self, activity_id: &str) -> Self {
        self.plan_item(PlanItem::human_task(activity_id))
    }

    pub fn process_task(self, activity_id: &str, process_definition_key: &str) -> Self {
        self.plan_item(PlanItem::process_task(activity_id, process_definition_key))
    }

    pub fn milestone(self, activity_id: &str) -> Self {
        self.plan_item(PlanItem::milestone(activity_id))
    }

    pub fn stage(self, activity_id: &str, children: Vec<PlanItem>) -> Self {
        self.plan_item(PlanItem::stage(activity_id, children))
    }

    pub fn build(self) -> Result<CaseDefinition> {
        validate_definition(&self.key, &self.plan_items)?;
        Ok(CaseDefinition {
            key: self.key,
            plan_items: self.plan_items,
        })
    }
}

fn validate_definition(key: &str, items: &[PlanItem]) -> Result<()> {
    if key.trim().is_empty() {
        return Err(CaseError::InvalidDefinition(
            "case definition key must not be empty".to_string(),
        ));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(key);

    let mut stack: Vec<&PlanItem> = items.iter().collect();
    while let Some(item) = stack.pop() {
        validate_item(key, item)?;
        if !seen.insert(item.activity_id.as_str()) {
            return Err(CaseError::InvalidDefinition(format!(
                "case '{}' declares activity id '{}' more than once",
                key, item.activity_id
            )));
        }
        stack.extend(item.children().iter());
    }

    Ok(())
}

fn validate_item(key: &str, item: &PlanItem) -> Result<()> {
    if item.activity_id.trim().is_empty() {
        return Err(CaseError::InvalidDefinition(format!(
            "case '{}' has a plan item with an empty activity id",
            key
        )));
    }

    match &item.kind {
        PlanItemKind::ProcessTask {
            process_definition_key,
        } if process_definition_key.trim().is_empty() => {
            Err(CaseError::InvalidDefinition(format!(
                "process task '{}' has no process definition key",
                item.activity_id
            )))
        }
        PlanItemKind::Stage { .. } | PlanItemKind::Milestone
            if item.activation == Activation::Automatic =>
        {
            Err(CaseError::InvalidDefinition(format!(
                "'{}': automatic activation applies to tasks only",
                item.activity_id
            )))
        }
        _ => Ok(()),
    }
}
