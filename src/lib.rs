// src/lib.rs

pub mod case;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod model;
pub mod process;
pub mod types;

use std::fmt::Write as _;

use anyhow::Result;
use tracing::debug;

use crate::case::{NodeKind, NodeState, Transition, TransitionOrigin, TransitionTable};
use crate::cli::{CliArgs, Command};
use crate::config::{EngineConfig, load_and_validate, load_or_default};

/// High-level entry point used by `main.rs`.
pub fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Table { config } => {
            let cfg = load_or_default(&config)?;
            print!("{}", render_table(&cfg.transition_table()));
        }
        Command::Check { config } => {
            let cfg = load_and_validate(&config)?;
            print!("{}", render_config(&cfg));
        }
    }
    Ok(())
}

/// Human-readable legality matrix: one line per `(kind, state)` that has at
/// least one legal transition.
pub fn render_table(table: &TransitionTable) -> String {
    let mut out = String::from("caseflow transition table\n");

    for kind in NodeKind::ALL {
        let _ = writeln!(out, "\n{kind}");
        for state in NodeState::ALL {
            let mut moves = Vec::new();
            for transition in Transition::CALLER {
                if let Some(effect) =
                    table.resolve(kind, state, false, transition, TransitionOrigin::Caller)
                {
                    let mut entry = format!("{transition} -> {}", effect.next);
                    if effect.closes {
                        entry.push_str(" (closes)");
                    }
                    if transition == Transition::Complete && kind.is_container() {
                        entry.push_str(" (guarded)");
                    }
                    moves.push(entry);
                }
            }
            for transition in [Transition::Complete, Transition::Fail] {
                if let Some(effect) =
                    table.resolve(kind, state, false, transition, TransitionOrigin::ProcessEngine)
                {
                    moves.push(format!("[process engine] {transition} -> {}", effect.next));
                }
            }
            if !moves.is_empty() {
                let _ = writeln!(out, "  {:<12} {}", state.to_string(), moves.join(", "));
            }
        }
    }

    debug!("transition table rendered");
    out
}

/// Effective settings as printed by `caseflow check`.
pub fn render_config(cfg: &EngineConfig) -> String {
    let mut out = String::from("caseflow configuration OK\n");
    let _ = writeln!(out, "  engine.inbox_capacity = {}", cfg.inbox_capacity);
    let _ = writeln!(out, "  policy.close ({}):", cfg.close_policy.rules().len());
    for rule in cfg.close_policy.rules() {
        let _ = writeln!(out, "    - {} in {}", rule.kind, rule.state);
    }
    out
}
