//! Observability setup for renderer processes.
//!
//! Installs a `tracing-subscriber` formatter filtered by `RUST_LOG` when set,
//! or by the configured default directive otherwise. Library crates only emit
//! events; binaries call [`init_tracing`] once at startup.

#![warn(missing_docs, clippy::pedantic)]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `param_kernel=debug`.
    pub default_directive: String,
    /// Include event targets in output.
    pub with_target: bool,
    /// Emit ANSI colour codes.
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_owned(),
            with_target: false,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Uses `directive` as the fallback filter.
    #[must_use]
    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    /// Toggles ANSI colour output.
    #[must_use]
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Toggles target names in output.
    #[must_use]
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A filter directive could not be parsed.
    #[error("invalid log filter `{directive}`: {reason}")]
    InvalidDirective {
        /// Directive that failed to parse.
        directive: String,
        /// Parser explanation.
        reason: String,
    },
    /// A global subscriber was already installed.
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
}

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Builds the filter from an explicit override, falling back to
/// `default_directive`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidDirective`] when the selected directive
/// does not parse.
pub fn build_filter(
    default_directive: &str,
    env_override: Option<&str>,
) -> TelemetryResult<EnvFilter> {
    let directive = env_override
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(default_directive);
    EnvFilter::try_new(directive).map_err(|err| TelemetryError::InvalidDirective {
        directive: directive.to_owned(),
        reason: err.to_string(),
    })
}

/// Installs the global fmt subscriber, writing to stderr.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidDirective`] for a bad filter and
/// [`TelemetryError::AlreadyInitialized`] when called more than once.
pub fn init_tracing(config: &TelemetryConfig) -> TelemetryResult<()> {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(&config.default_directive, from_env.as_deref())?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(config.with_target)
                .with_ansi(config.ansi)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|_| TelemetryError::AlreadyInitialized)?;

    tracing::debug!(directive = %config.default_directive, "tracing initialized");
    Ok(())
}
