//! Configuration for the parameter renderer.
//!
//! Settings come from an optional JSON file and are then overridden by
//! `PARAM_RENDER_*` environment variables. The validated [`RenderConfig`]
//! converts into the typed configuration each runtime crate expects.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    ENV_CACHE_TTL_SECS, ENV_CALL_TIMEOUT_MS, ENV_LOG, ENV_MAX_CONCURRENCY, ENV_PREFIX,
};
pub use schema::{RenderConfig, RetrySettings};
