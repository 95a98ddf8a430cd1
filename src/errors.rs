// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::case::{NodeKind, NodeState, Transition};
use crate::types::CaseInstanceId;

#[derive(Error, Debug)]
pub enum CaseError {
    #[error("Invalid transition: cannot {transition} {kind} '{node}' in state {state}")]
    InvalidTransition {
        node: String,
        kind: NodeKind,
        state: NodeState,
        transition: Transition,
    },

    #[error("Process definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("Process task '{0}' is not waiting for a process instance")]
    NotAwaitingSpawn(String),

    #[error("Case definition not found: {0}")]
    CaseDefinitionNotFound(String),

    #[error("Case instance not found: {0}")]
    CaseInstanceNotFound(CaseInstanceId),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid case definition: {0}")]
    InvalidDefinition(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CaseError {
    /// True for the error a caller gets back when the requested transition
    /// is not legal for the node's kind and state.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, CaseError::InvalidTransition { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CaseError>;
