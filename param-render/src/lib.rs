//! Secret-reference rendering for JSON configuration documents.
//!
//! Depend on this crate to get the whole renderer. It bundles the component
//! crates behind feature flags so consumers that only need, say, the URI types
//! or the access gates can leave the rest out.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use param_primitives as primitives;

/// Render pipeline, retry, and scheduling (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use param_kernel as kernel;

/// Access gates and role bindings (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use param_policy as policy;

/// Secret stores, cache, and resolver (enabled by `resolver` feature).
#[cfg(feature = "resolver")]
pub use param_resolver as resolver;

/// File and environment configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use param_config as config;

/// Tracing subscriber setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use param_telemetry as telemetry;
