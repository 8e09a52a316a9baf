//! Rendering kernel for secret-referencing configuration documents.
//!
//! A render walks a fixed sequence of phases: parse the document for
//! `__REF__(secret://...)` tokens, authorize every referenced secret, resolve
//! the payloads concurrently, then substitute them into a copy of the
//! document. Any failure aborts the render without returning a partial result.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod parser;
mod phase;
mod renderer;
mod retry;
mod scheduler;

pub use error::{ErrorKind, RenderError, RenderResult};
pub use parser::{DEFAULT_PREFIX, ReferenceParser};
pub use phase::{PhaseError, PhaseEvent, PhaseResult, RenderPhase, RenderProgress};
pub use renderer::{PayloadRenderer, RenderOptions};
pub use retry::{RetryPolicy, RetryPolicyError, retry_render};
pub use scheduler::{SchedulerConfig, SchedulerError, SchedulerResult, TaskScheduler};
