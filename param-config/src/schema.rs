//! Configuration schema and conversions into runtime types.

use std::num::{NonZeroU32, NonZeroUsize};
use std::time::Duration;

use param_kernel::{DEFAULT_PREFIX, ReferenceParser, RetryPolicy, SchedulerConfig};
use param_resolver::{CacheConfig, ResolverConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Backoff settings for caller-side retries of transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    pub scaling: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
            scaling: 2.0,
        }
    }
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Marker introducing a reference, `__REF__` by default.
    pub reference_prefix: String,
    /// Bound for each authorization and store call, in milliseconds.
    pub call_timeout_ms: Option<u64>,
    /// Lifetime of cached pinned secrets; unset keeps them until evicted.
    pub cache_ttl_secs: Option<u64>,
    /// Maximum number of cached secrets; unset means unbounded.
    pub cache_capacity: Option<usize>,
    /// Maximum number of concurrent store and authorization calls.
    pub max_concurrency: usize,
    /// Retry settings.
    pub retry: RetrySettings,
    /// Default `tracing` filter directive.
    pub log_filter: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            reference_prefix: DEFAULT_PREFIX.to_owned(),
            call_timeout_ms: Some(5_000),
            cache_ttl_secs: None,
            cache_capacity: None,
            max_concurrency: 32,
            retry: RetrySettings::default(),
            log_filter: "info".to_owned(),
        }
    }
}

impl RenderConfig {
    /// Checks every setting for range errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        ReferenceParser::with_prefix(self.reference_prefix.as_str())
            .map_err(|err| ConfigError::invalid("reference_prefix", err.to_string()))?;

        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::invalid(
                "call_timeout_ms",
                "must be greater than zero when set",
            ));
        }
        if self.cache_ttl_secs == Some(0) {
            return Err(ConfigError::invalid(
                "cache_ttl_secs",
                "must be greater than zero when set",
            ));
        }
        if self.cache_capacity == Some(0) {
            return Err(ConfigError::invalid(
                "cache_capacity",
                "must be greater than zero when set",
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid(
                "max_concurrency",
                "must be greater than zero",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "retry.max_attempts",
                "must be greater than zero",
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::invalid("log_filter", "must not be empty"));
        }
        self.retry_policy()
            .validate()
            .map_err(|err| ConfigError::invalid("retry", err.to_string()))
    }

    /// Parser for the configured prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the prefix is not usable.
    pub fn parser(&self) -> ConfigResult<ReferenceParser> {
        ReferenceParser::with_prefix(self.reference_prefix.as_str())
            .map_err(|err| ConfigError::invalid("reference_prefix", err.to_string()))
    }

    /// Per-call timeout, if configured.
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Cache and timeout settings for the resolver.
    #[must_use]
    pub fn resolver_config(&self) -> ResolverConfig {
        let mut cache = CacheConfig::new();
        if let Some(ttl) = self.cache_ttl_secs {
            cache = cache.with_ttl(Duration::from_secs(ttl));
        }
        if let Some(capacity) = self.cache_capacity.and_then(NonZeroUsize::new) {
            cache = cache.with_capacity(capacity);
        }

        let config = ResolverConfig::new().with_cache(cache);
        match self.call_timeout() {
            Some(timeout) => config.with_call_timeout(timeout),
            None => config,
        }
    }

    /// Concurrency limit for the render scheduler.
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let limit = NonZeroUsize::new(self.max_concurrency).unwrap_or(NonZeroUsize::MIN);
        SchedulerConfig::new(limit)
    }

    /// Backoff policy for caller-side retries.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let attempts = NonZeroU32::new(self.retry.max_attempts).unwrap_or(NonZeroU32::MIN);
        RetryPolicy::new()
            .with_max_attempts(attempts)
            .with_initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_scaling(self.retry.scaling)
    }
}
