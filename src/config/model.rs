// src/config/model.rs

use serde::Deserialize;

use crate::case::{ClosePolicy, CloseRule, TransitionTable};
use crate::case::transition::default_close_rules;

/// Engine configuration as read from a TOML file, before validation.
///
/// ```toml
/// [engine]
/// inbox_capacity = 64
///
/// [policy]
/// close = [
///   { kind = "case_instance", state = "completed" },
///   { kind = "case_instance", state = "terminated" },
/// ]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawEngineConfig {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub policy: PolicySection,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Capacity of each case instance's inbox. Senders wait when it is full.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

fn default_inbox_capacity() -> usize {
    64
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

/// `[policy]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    /// `(kind, state)` pairs in which `close` is legal.
    #[serde(default = "default_close_rules")]
    pub close: Vec<CloseRule>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            close: default_close_rules(),
        }
    }
}

/// Validated engine configuration.
///
/// Built from [`RawEngineConfig`] through `TryFrom`, which rejects
/// inconsistent settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub inbox_capacity: usize,
    pub close_policy: ClosePolicy,
}

impl EngineConfig {
    pub(crate) fn new_unchecked(inbox_capacity: usize, close_policy: ClosePolicy) -> Self {
        Self {
            inbox_capacity,
            close_policy,
        }
    }

    pub fn transition_table(&self) -> TransitionTable {
        TransitionTable::new(self.close_policy.clone())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new_unchecked(default_inbox_capacity(), ClosePolicy::default())
    }
}
