//! Executor subsystem modules.

pub mod core;
pub(crate) mod frame;

pub use core::{CompId, Executor, RunState, Spawn};
