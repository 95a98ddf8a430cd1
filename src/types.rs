// src/types.rs

use std::fmt;

/// Identifier of a running case instance.
///
/// Assigned by the `CaseService` from a monotonically increasing counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseInstanceId(pub u64);

impl fmt::Display for CaseInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "case-{}", self.0)
    }
}

/// Opaque handle to a process instance spawned by the external process
/// engine. The case tree only stores it and compares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessHandle(String);

impl ProcessHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a task plan item is activated when the case instance is created.
///
/// - `Manual`: the task starts `Enabled` and waits for `manualStart`
///   (default behaviour).
/// - `Automatic`: the task starts `Active` right away; process tasks spawn
///   their process instance as part of case creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Manual,
    Automatic,
}
