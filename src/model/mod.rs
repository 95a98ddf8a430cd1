// src/model/mod.rs

//! Case definitions: the typed, already-materialized plan a case instance
//! is built from.
//!
//! Definitions are assembled with [`CaseDefinition::builder`] and validated
//! on `build()` (unique activity ids, process tasks carry a process
//! definition key, automatic activation only on tasks).

pub mod definition;

pub use definition::{CaseDefinition, CaseDefinitionBuilder, PlanItem, PlanItemKind};
