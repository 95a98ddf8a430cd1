// src/case/transition.rs

//! Legality table for node transitions.
//!
//! The table is plain data keyed by `(kind, state, transition, origin)` so it
//! can be printed (`caseflow table`) and tested exhaustively. Guards that
//! depend on the rest of the tree (e.g. explicit completion of the root)
//! are applied by the instance after the table has accepted a request.
//!
//! `close` is not in the static table: which `(kind, state)` pairs may be
//! closed is a configurable [`ClosePolicy`].

use std::fmt;

use serde::Deserialize;

use crate::case::node::{NodeKind, NodeState};

/// A requested lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    ManualStart,
    Disable,
    Reenable,
    Complete,
    Terminate,
    Close,
    /// Internal: the bound process instance reported failure.
    Fail,
}

impl Transition {
    /// Transitions a caller may request through the service API.
    pub const CALLER: [Transition; 6] = [
        Transition::ManualStart,
        Transition::Disable,
        Transition::Reenable,
        Transition::Complete,
        Transition::Terminate,
        Transition::Close,
    ];
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Transition::ManualStart => "manually start",
            Transition::Disable => "disable",
            Transition::Reenable => "re-enable",
            Transition::Complete => "complete",
            Transition::Terminate => "terminate",
            Transition::Close => "close",
            Transition::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// Who is asking for the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOrigin {
    /// A caller of the case service.
    Caller,
    /// The process task bridge, reacting to the external process engine.
    ProcessEngine,
}

/// One legal row of the table.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub kinds: &'static [NodeKind],
    pub from: NodeState,
    pub transition: Transition,
    pub origin: TransitionOrigin,
    pub to: NodeState,
}

const TASKS: &[NodeKind] = &[NodeKind::HumanTask, NodeKind::ProcessTask];
const CONTAINERS: &[NodeKind] = &[NodeKind::Stage, NodeKind::CaseInstanceRoot];

use NodeState::*;
use Transition::*;
use TransitionOrigin::{Caller, ProcessEngine};

/// Every legal non-close transition. Anything not listed is illegal.
#[rustfmt::skip]
pub const RULES: &[Rule] = &[
    Rule { kinds: TASKS, from: Enabled, transition: ManualStart, origin: Caller, to: Active },
    Rule { kinds: TASKS, from: Enabled, transition: Disable, origin: Caller, to: Disabled },
    Rule { kinds: TASKS, from: Disabled, transition: Reenable, origin: Caller, to: Enabled },
    Rule { kinds: &[NodeKind::HumanTask], from: Active, transition: Complete, origin: Caller, to: Completed },
    // A process task completes only through its bound process instance.
    Rule { kinds: &[NodeKind::ProcessTask], from: Active, transition: Complete, origin: ProcessEngine, to: Completed },
    Rule { kinds: &[NodeKind::ProcessTask], from: Active, transition: Fail, origin: ProcessEngine, to: Failed },
    Rule { kinds: TASKS, from: Failed, transition: Terminate, origin: Caller, to: Terminated },
    Rule { kinds: &[NodeKind::Milestone], from: Available, transition: Complete, origin: Caller, to: Completed },
    Rule { kinds: &[NodeKind::Milestone], from: Available, transition: Terminate, origin: Caller, to: Terminated },
    Rule { kinds: CONTAINERS, from: Active, transition: Terminate, origin: Caller, to: Terminated },
    // Guarded by the instance: no active/failed child, no open required child.
    Rule { kinds: &[NodeKind::CaseInstanceRoot], from: Active, transition: Complete, origin: Caller, to: Completed },
];

/// A `(kind, state)` pair from which `close` is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CloseRule {
    pub kind: NodeKind,
    pub state: NodeState,
}

/// Which nodes may be closed, and from which states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosePolicy {
    rules: Vec<CloseRule>,
}

impl ClosePolicy {
    pub fn new(rules: Vec<CloseRule>) -> Self {
        Self { rules }
    }

    pub fn allows(&self, kind: NodeKind, state: NodeState) -> bool {
        self.rules.iter().any(|r| r.kind == kind && r.state == state)
    }

    pub fn rules(&self) -> &[CloseRule] {
        &self.rules
    }
}

impl Default for ClosePolicy {
    /// Only a finished case instance can be closed.
    fn default() -> Self {
        Self::new(default_close_rules())
    }
}

pub fn default_close_rules() -> Vec<CloseRule> {
    vec![
        CloseRule { kind: NodeKind::CaseInstanceRoot, state: Completed },
        CloseRule { kind: NodeKind::CaseInstanceRoot, state: Terminated },
    ]
}

/// What an accepted transition does to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    /// State the node ends up in (unchanged when closing a terminal node).
    pub next: NodeState,
    /// Whether the node is marked closed.
    pub closes: bool,
}

/// The full legality table: static rules plus the configured close policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    close: ClosePolicy,
}

impl TransitionTable {
    pub fn new(close: ClosePolicy) -> Self {
        Self { close }
    }

    pub fn close_policy(&self) -> &ClosePolicy {
        &self.close
    }

    /// Evaluate a request against the table. `None` means illegal.
    pub fn resolve(
        &self,
        kind: NodeKind,
        state: NodeState,
        closed: bool,
        transition: Transition,
        origin: TransitionOrigin,
    ) -> Option<Effect> {
        if transition == Close {
            if closed || origin != Caller || !self.close.allows(kind, state) {
                return None;
            }
            let next = if state.is_terminal() { state } else { Terminated };
            return Some(Effect { next, closes: true });
        }

        next_state(kind, state, transition, origin).map(|next| Effect {
            next,
            closes: false,
        })
    }
}

/// Look up the static rules (everything except `close`).
pub fn next_state(
    kind: NodeKind,
    state: NodeState,
    transition: Transition,
    origin: TransitionOrigin,
) -> Option<NodeState> {
    RULES
        .iter()
        .find(|r| {
            r.from == state
                && r.transition == transition
                && r.origin == origin
                && r.kinds.contains(&kind)
        })
        .map(|r| r.to)
}
