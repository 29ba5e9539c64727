//! Cooperative concurrency runtime with incremental output streaming.
//!
//! This crate lets a single request handler suspend on timers, socket
//! readiness, thread-offloaded blocking calls or other promises while
//! incrementally streaming output chunks back to a client connection, all on
//! one reactor thread.
//!
//! # Architecture
//!
//! - **Promise**: single-assignment result cell with completion continuations
//! - **EventLoop**: single-threaded reactor owning the timer queue, socket
//!   watches and ready queue
//! - **ThreadBridge**: bounded worker pool whose results cross back through
//!   the loop's completion channel
//! - **Executor**: drives suspendable computations, flattening nested
//!   delegation onto an explicit frame stack
//! - **StreamingAdapter**: forwards produced chunks to a response transport
//!   in order, with backpressure
//! - **compat**: adapters unifying the explicit-production,
//!   implicit-suspension and legacy promise-parameter authoring styles
//! - **RuntimeBuilder**: fluent builder for runtime instantiation

mod bridge;
mod builder;
pub mod compat;
mod error;
pub mod executor;
mod promise;
pub mod reactor;
mod runtime;
pub mod stream;
mod suspend;
mod value;

pub use builder::RuntimeBuilder;
pub use error::RuntimeError;
pub use executor::{CompId, Executor, RunState, Spawn};
pub use promise::{Outcome, Promise};
pub use reactor::{EventLoop, Interest, TimerKey, WatchToken};
pub use runtime::Runtime;
pub use stream::{MemoryTransport, PushOutcome, StreamingAdapter, Transport};
pub use suspend::{BlockingJob, Resumption, Step, Suspendable, Suspension};
pub use value::Value;
