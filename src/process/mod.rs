// src/process/mod.rs

//! Boundary to the external process engine.
//!
//! - [`backend`] provides the `ProcessEngine` trait, the `SpawnRequest` it
//!   receives and the `CompletionNotifier` used to report back.
//! - [`channel`] provides `ChannelProcessEngine`, which forwards starts to a
//!   host-owned engine over an mpsc channel.

pub mod backend;
pub mod channel;

pub use backend::{CompletionNotifier, ProcessEngine, SpawnRequest};
pub use channel::{ChannelProcessEngine, ProcessStart};
