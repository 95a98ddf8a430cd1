// src/config/validate.rs

use std::collections::HashSet;

use crate::case::{ClosePolicy, NodeKind, NodeState};
use crate::config::model::{EngineConfig, RawEngineConfig};
use crate::errors::{CaseError, Result};

impl TryFrom<RawEngineConfig> for EngineConfig {
    type Error = CaseError;

    fn try_from(raw: RawEngineConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(EngineConfig::new_unchecked(
            raw.engine.inbox_capacity,
            ClosePolicy::new(raw.policy.close),
        ))
    }
}

fn validate_raw_config(cfg: &RawEngineConfig) -> Result<()> {
    validate_engine_section(cfg)?;
    validate_close_policy(cfg)?;
    Ok(())
}

fn validate_engine_section(cfg: &RawEngineConfig) -> Result<()> {
    if cfg.engine.inbox_capacity == 0 {
        return Err(CaseError::ConfigError(
            "[engine].inbox_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

/// Work in progress cannot be closed away: a task that is enabled or active
/// must be completed, disabled or terminated first.
fn validate_close_policy(cfg: &RawEngineConfig) -> Result<()> {
    for rule in &cfg.policy.close {
        let open_task = rule.kind.is_task()
            && matches!(rule.state, NodeState::Enabled | NodeState::Active);
        if open_task {
            return Err(CaseError::ConfigError(format!(
                "[policy].close must not allow closing a {} in state '{}'",
                rule.kind, rule.state
            )));
        }
    }

    let mut seen = HashSet::new();
    for rule in &cfg.policy.close {
        if !seen.insert((rule.kind, rule.state)) {
            return Err(CaseError::ConfigError(format!(
                "[policy].close lists ({}, {}) more than once",
                kind_key(rule.kind),
                rule.state
            )));
        }
    }
    Ok(())
}

fn kind_key(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Stage => "stage",
        NodeKind::HumanTask => "human_task",
        NodeKind::ProcessTask => "process_task",
        NodeKind::Milestone => "milestone",
        NodeKind::CaseInstanceRoot => "case_instance",
    }
}
