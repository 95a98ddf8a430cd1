#![allow(dead_code)]

use caseflow::case::{CloseRule, NodeKind, NodeState};
use caseflow::config::{EngineConfig, EngineSection, PolicySection, RawEngineConfig};
use caseflow::model::{CaseDefinition, PlanItem};

/// Key of the single-process-task case used across the tests.
pub const DEFINITION_KEY: &str = "oneProcessTaskCase";
/// Activity id of its process task.
pub const PROCESS_TASK_KEY: &str = "PI_ProcessTask_1";
/// Process definition the process task starts.
pub const PROCESS_DEFINITION_KEY: &str = "oneTaskProcess";

pub const TWO_TASK_DEFINITION_KEY: &str = "oneProcessTaskAndOneHumanTaskCase";
pub const HUMAN_TASK_KEY: &str = "PI_HumanTask_1";

/// Builder for `EngineConfig` to simplify test setup.
pub struct EngineConfigBuilder {
    config: RawEngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawEngineConfig {
                engine: EngineSection::default(),
                policy: PolicySection::default(),
            },
        }
    }

    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.config.engine.inbox_capacity = capacity;
        self
    }

    pub fn allow_close(mut self, kind: NodeKind, state: NodeState) -> Self {
        self.config.policy.close.push(CloseRule { kind, state });
        self
    }

    pub fn build(self) -> EngineConfig {
        EngineConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A case with one manually activated process task.
pub fn one_process_task_case() -> CaseDefinition {
    CaseDefinition::builder(DEFINITION_KEY)
        .process_task(PROCESS_TASK_KEY, PROCESS_DEFINITION_KEY)
        .build()
        .expect("valid definition")
}

/// A case with one process task and one human task, both manual.
pub fn one_process_task_and_one_human_task_case() -> CaseDefinition {
    CaseDefinition::builder(TWO_TASK_DEFINITION_KEY)
        .process_task(PROCESS_TASK_KEY, PROCESS_DEFINITION_KEY)
        .human_task(HUMAN_TASK_KEY)
        .build()
        .expect("valid definition")
}

/// A case whose process task is started as part of case creation.
pub fn automatic_process_task_case(definition_key: &str, process_key: &str) -> CaseDefinition {
    CaseDefinition::builder(definition_key)
        .plan_item(PlanItem::process_task(PROCESS_TASK_KEY, process_key).automatic())
        .build()
        .expect("valid definition")
}
