//! Runtime subsystem modules.

mod core;

pub use core::Runtime;
pub(crate) use core::{DEFAULT_LEGACY_GUARD, DEFAULT_WORKERS};
