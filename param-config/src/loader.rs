//! File and environment loading.

use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::RenderConfig;

/// Overrides [`RenderConfig::reference_prefix`].
pub const ENV_PREFIX: &str = "PARAM_RENDER_PREFIX";
/// Overrides [`RenderConfig::call_timeout_ms`].
pub const ENV_CALL_TIMEOUT_MS: &str = "PARAM_RENDER_CALL_TIMEOUT_MS";
/// Overrides [`RenderConfig::cache_ttl_secs`].
pub const ENV_CACHE_TTL_SECS: &str = "PARAM_RENDER_CACHE_TTL_SECS";
/// Overrides [`RenderConfig::max_concurrency`].
pub const ENV_MAX_CONCURRENCY: &str = "PARAM_RENDER_MAX_CONCURRENCY";
/// Overrides [`RenderConfig::log_filter`].
pub const ENV_LOG: &str = "PARAM_RENDER_LOG";

impl RenderConfig {
    /// Loads and validates a JSON configuration file. Missing fields take
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read,
    /// [`ConfigError::Parse`] for malformed or unknown fields, and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the optional file, applies process environment overrides, and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns any [`ConfigError`] raised while reading, overriding, or
    /// validating.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let base = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        base.with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Applies `PARAM_RENDER_*` overrides found through `lookup`, then
    /// validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for unparsable values and
    /// [`ConfigError::Invalid`] when the result is out of range.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = lookup(ENV_PREFIX) {
            self.reference_prefix = prefix;
        }
        if let Some(timeout) = parse_env(&lookup, ENV_CALL_TIMEOUT_MS)? {
            self.call_timeout_ms = Some(timeout);
        }
        if let Some(ttl) = parse_env(&lookup, ENV_CACHE_TTL_SECS)? {
            self.cache_ttl_secs = Some(ttl);
        }
        if let Some(limit) = parse_env(&lookup, ENV_MAX_CONCURRENCY)? {
            self.max_concurrency = limit;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }

        self.validate()?;
        Ok(self)
    }

    fn read_file(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config =
            serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse { source })?;
        debug!(path = %path.display(), "render config loaded");
        Ok(config)
    }
}

fn parse_env<F, T>(lookup: &F, var: &'static str) -> ConfigResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn loads_partial_file_with_defaults() {
        let file = write_config(
            r#"{"reference_prefix": "$ref", "cache_capacity": 10, "retry": {"max_attempts": 5}}"#,
        );
        let config = RenderConfig::from_path(file.path()).unwrap();

        assert_eq!(config.reference_prefix, "$ref");
        assert_eq!(config.cache_capacity, Some(10));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 100);
        assert_eq!(config.max_concurrency, 32);
    }

    #[test]
    fn reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            RenderConfig::from_path(&missing),
            Err(ConfigError::Io { .. })
        ));

        let file = write_config("{not json");
        assert!(matches!(
            RenderConfig::from_path(file.path()),
            Err(ConfigError::Parse { .. })
        ));

        let file = write_config(r#"{"unknown_setting": true}"#);
        assert!(matches!(
            RenderConfig::from_path(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn file_values_are_validated() {
        let file = write_config(r#"{"max_concurrency": 0}"#);
        assert!(matches!(
            RenderConfig::from_path(file.path()),
            Err(ConfigError::Invalid { field: "max_concurrency", .. })
        ));
    }

    #[test]
    fn environment_overrides_file_values() {
        let config = RenderConfig::from_json_str(r#"{"call_timeout_ms": 100}"#)
            .unwrap()
            .with_env_overrides(env(&[
                (ENV_PREFIX, "__SECRET__"),
                (ENV_CALL_TIMEOUT_MS, "250"),
                (ENV_CACHE_TTL_SECS, "60"),
                (ENV_MAX_CONCURRENCY, " 4 "),
                (ENV_LOG, "param_kernel=debug"),
            ]))
            .unwrap();

        assert_eq!(config.reference_prefix, "__SECRET__");
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.cache_ttl_secs, Some(60));
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.log_filter, "param_kernel=debug");
    }

    #[test]
    fn bad_environment_values_are_rejected() {
        let err = RenderConfig::default()
            .with_env_overrides(env(&[(ENV_CALL_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { var: ENV_CALL_TIMEOUT_MS, .. }
        ));

        let err = RenderConfig::default()
            .with_env_overrides(env(&[(ENV_MAX_CONCURRENCY, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn empty_environment_changes_nothing() {
        let config = RenderConfig::default().with_env_overrides(env(&[])).unwrap();
        assert_eq!(config, RenderConfig::default());
    }
}
