//! Secret resolution on top of a store and the shared cache.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use param_primitives::{Identity, SecretUri};
use tracing::{debug, instrument};

use crate::cache::{CacheConfig, CacheStats, SecretCache};
use crate::error::{ResolveError, ResolveResult};
use crate::store::{SecretStore, StoreCredentials};

/// A fetched secret payload.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue {
    uri: SecretUri,
    value: Bytes,
    fetched_at: DateTime<Utc>,
}

impl SecretValue {
    /// Creates a value for `uri` fetched at `fetched_at`.
    #[must_use]
    pub fn new(uri: SecretUri, value: Bytes, fetched_at: DateTime<Utc>) -> Self {
        Self {
            uri,
            value,
            fetched_at,
        }
    }

    /// URI the value was fetched for.
    #[must_use]
    pub fn uri(&self) -> &SecretUri {
        &self.uri
    }

    /// Raw payload bytes.
    #[must_use]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Payload as UTF-8 text, if it is valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    /// When the payload was read from the store.
    #[must_use]
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("uri", &self.uri)
            .field("value", &format_args!("<{} bytes redacted>", self.value.len()))
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

/// Configuration for [`SecretResolver`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolverConfig {
    cache: CacheConfig,
    call_timeout: Option<Duration>,
}

impl ResolverConfig {
    /// Unbounded cache and no default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the cache configuration.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Bounds store calls that do not carry their own timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Returns the cache configuration.
    #[must_use]
    pub const fn cache(self) -> CacheConfig {
        self.cache
    }

    /// Returns the default call timeout.
    #[must_use]
    pub const fn call_timeout(self) -> Option<Duration> {
        self.call_timeout
    }
}

/// Resolves secret URIs to payloads through a read-through cache.
pub struct SecretResolver {
    store: Arc<dyn SecretStore>,
    cache: SecretCache,
    call_timeout: Option<Duration>,
}

impl fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretResolver")
            .field("store", &"dyn SecretStore")
            .field("cache", &self.cache)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl SecretResolver {
    /// Creates a resolver with default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self::with_config(store, ResolverConfig::default())
    }

    /// Creates a resolver with the supplied configuration.
    #[must_use]
    pub fn with_config(store: Arc<dyn SecretStore>, config: ResolverConfig) -> Self {
        Self {
            store,
            cache: SecretCache::new(config.cache()),
            call_timeout: config.call_timeout(),
        }
    }

    /// Resolves `uri` on behalf of `identity` using the default timeout.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ResolveError`] reported by the store, or
    /// [`ResolveError::Transient`] when the call times out.
    pub async fn resolve(&self, uri: &SecretUri, identity: &Identity) -> ResolveResult<SecretValue> {
        self.resolve_with_timeout(uri, identity, None).await
    }

    /// Resolves `uri`, bounding the wait by `timeout`, or by the configured
    /// default when `timeout` is `None`.
    ///
    /// Joining a fetch already in flight for the same URI shares that fetch's
    /// credentials, but every caller stops waiting at its own deadline. The
    /// fetch itself runs until it completes or its last waiter gives up.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ResolveError`] reported by the store, or
    /// [`ResolveError::Transient`] when the call times out.
    #[instrument(level = "debug", skip_all, fields(uri = %uri, identity = %identity))]
    pub async fn resolve_with_timeout(
        &self,
        uri: &SecretUri,
        identity: &Identity,
        timeout: Option<Duration>,
    ) -> ResolveResult<SecretValue> {
        let store = Arc::clone(&self.store);
        let target = uri.clone();
        let credentials = StoreCredentials::for_identity(identity.clone());

        let lookup = self.cache.get_or_fetch(uri, move || {
            async move {
                let payload = store
                    .get_secret(&target, &credentials, target.version())
                    .await
                    .map_err(|err| ResolveError::from_store(&target, err))?;

                debug!(uri = %target, bytes = payload.len(), "secret fetched");
                Ok::<_, ResolveError>(SecretValue::new(target, payload, Utc::now()))
            }
            .boxed()
        });

        match timeout.or(self.call_timeout) {
            Some(limit) => tokio::time::timeout(limit, lookup).await.map_err(|_| {
                debug!(%uri, ?limit, "secret fetch timed out");
                ResolveError::Transient {
                    uri: uri.clone(),
                    reason: format!("secret fetch timed out after {limit:?}"),
                }
            })?,
            None => lookup.await,
        }
    }

    /// Drops every cached secret.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
