//! Read-through secret cache with single-flight fetches.
//!
//! Entries are keyed by the canonical URI string. Only pinned URIs are ever
//! served from a stored entry; `latest` lookups always reach the store, though
//! concurrent lookups of the same URI still share one in-flight fetch.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use param_primitives::SecretUri;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ResolveResult;
use crate::resolver::SecretValue;

type SharedFetch = Shared<BoxFuture<'static, ResolveResult<SecretValue>>>;

/// Configuration for the secret cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheConfig {
    ttl: Option<Duration>,
    capacity: Option<NonZeroUsize>,
}

impl CacheConfig {
    /// Pinned entries live forever and the cache is unbounded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expires pinned entries `ttl` after they were stored.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Bounds the number of stored entries, evicting the oldest first.
    #[must_use]
    pub fn with_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Returns the configured TTL, if any.
    #[must_use]
    pub const fn ttl(self) -> Option<Duration> {
        self.ttl
    }

    /// Returns the configured capacity, if any.
    #[must_use]
    pub const fn capacity(self) -> Option<NonZeroUsize> {
        self.capacity
    }
}

enum Slot {
    Ready {
        value: SecretValue,
        stored_at: Instant,
    },
    Pending {
        id: u64,
        fetch: WeakShared<BoxFuture<'static, ResolveResult<SecretValue>>>,
    },
}

#[derive(Default)]
struct CacheInner {
    slots: HashMap<String, Slot>,
    next_id: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

/// Snapshot of cache utilisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Stored (ready) entries.
    pub entries: usize,
    /// Fetches currently in flight.
    pub in_flight: usize,
    /// Lookups answered from a stored entry.
    pub hits: u64,
    /// Lookups that started a new fetch.
    pub misses: u64,
    /// Lookups that joined a fetch already in flight.
    pub coalesced: u64,
}

/// Concurrent read-through cache shared by every render of a resolver.
pub struct SecretCache {
    config: CacheConfig,
    inner: Arc<Mutex<CacheInner>>,
    counters: Counters,
}

impl fmt::Debug for SecretCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCache")
            .field("config", &self.config)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl SecretCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(CacheInner::default())),
            counters: Counters::default(),
        }
    }

    /// Returns the cache configuration.
    #[must_use]
    pub const fn config(&self) -> CacheConfig {
        self.config
    }

    /// Returns the cached value for `uri`, or runs `fetch` to produce it.
    ///
    /// At most one fetch per URI is in flight; concurrent callers await the
    /// same result. The fetch is dropped once every waiter has gone away, and
    /// its pending slot with it.
    ///
    /// # Errors
    ///
    /// Propagates the error produced by the fetch.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub async fn get_or_fetch<F>(&self, uri: &SecretUri, fetch: F) -> ResolveResult<SecretValue>
    where
        F: FnOnce() -> BoxFuture<'static, ResolveResult<SecretValue>>,
    {
        let key = uri.to_string();
        let shared = {
            let mut guard = self.inner.lock().expect("secret cache poisoned");
            let joined = match guard.slots.get(&key) {
                Some(Slot::Ready { value, stored_at })
                    if uri.is_pinned() && self.is_fresh(*stored_at) =>
                {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(%uri, "secret cache hit");
                    return Ok(value.clone());
                }
                Some(Slot::Pending { fetch, .. }) => fetch.upgrade(),
                _ => None,
            };

            if let Some(shared) = joined {
                self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(%uri, "joining in-flight secret fetch");
                shared
            } else {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.start_fetch(&mut guard, key, uri.is_pinned(), fetch())
            }
        };

        shared.await
    }

    fn start_fetch(
        &self,
        inner: &mut CacheInner,
        key: String,
        pinned: bool,
        fetch: BoxFuture<'static, ResolveResult<SecretValue>>,
    ) -> SharedFetch {
        inner.next_id = inner.next_id.wrapping_add(1);
        let id = inner.next_id;
        let cache = Arc::clone(&self.inner);
        let config = self.config;
        let completion_key = key.clone();

        let abandon = PendingGuard {
            cache: Arc::clone(&cache),
            key: completion_key.clone(),
            id,
        };

        let shared = async move {
            let _abandon = abandon;
            let result = fetch.await;
            complete(&cache, &completion_key, id, pinned, config, &result);
            result
        }
        .boxed()
        .shared();

        if let Some(weak) = shared.downgrade() {
            inner.slots.insert(key, Slot::Pending { id, fetch: weak });
        }
        shared
    }

    fn is_fresh(&self, stored_at: Instant) -> bool {
        self.config
            .ttl()
            .is_none_or(|ttl| stored_at.elapsed() < ttl)
    }

    /// Drops every stored entry and forgets in-flight fetches.
    ///
    /// Fetches already running still deliver to their waiters but are not
    /// stored.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn clear(&self) {
        self.inner.lock().expect("secret cache poisoned").slots.clear();
    }

    /// Returns statistics about the cache.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let guard = self.inner.lock().expect("secret cache poisoned");
        let entries = guard
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count();
        CacheStats {
            entries,
            in_flight: guard.slots.len() - entries,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
        }
    }
}

impl Default for SecretCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Removes a pending slot whose fetch was dropped before completing.
struct PendingGuard {
    cache: Arc<Mutex<CacheInner>>,
    key: String,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let Ok(mut guard) = self.cache.lock() else {
            return;
        };
        if owns_pending(&guard, &self.key, self.id) {
            guard.slots.remove(&self.key);
            debug!(key = %self.key, "abandoned secret fetch dropped");
        }
    }
}

fn owns_pending(inner: &CacheInner, key: &str, id: u64) -> bool {
    matches!(inner.slots.get(key), Some(Slot::Pending { id: pending, .. }) if *pending == id)
}

fn complete(
    cache: &Mutex<CacheInner>,
    key: &str,
    id: u64,
    pinned: bool,
    config: CacheConfig,
    result: &ResolveResult<SecretValue>,
) {
    let mut guard = cache.lock().expect("secret cache poisoned");
    if !owns_pending(&guard, key, id) {
        return;
    }

    match result {
        Ok(value) if pinned => {
            guard.slots.insert(
                key.to_owned(),
                Slot::Ready {
                    value: value.clone(),
                    stored_at: Instant::now(),
                },
            );
            if let Some(capacity) = config.capacity() {
                evict_oldest(&mut guard, capacity.get());
            }
        }
        _ => {
            guard.slots.remove(key);
        }
    }
}

fn evict_oldest(inner: &mut CacheInner, capacity: usize) {
    loop {
        let ready = inner
            .slots
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Ready { stored_at, .. } => Some((key, *stored_at)),
                Slot::Pending { .. } => None,
            });
        let (count, oldest) = ready.fold((0usize, None::<(&String, Instant)>), |(count, oldest), entry| {
            let oldest = match oldest {
                Some(current) if current.1 <= entry.1 => Some(current),
                _ => Some(entry),
            };
            (count + 1, oldest)
        });

        let Some((key, _)) = oldest.filter(|_| count > capacity) else {
            break;
        };
        let key = key.clone();
        debug!(key = %key, "evicting cached secret");
        inner.slots.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use bytes::Bytes;
    use chrono::Utc;

    use crate::error::ResolveError;

    fn uri(raw: &str) -> SecretUri {
        SecretUri::parse(raw).unwrap()
    }

    fn value_for(uri: &SecretUri, payload: &'static str) -> SecretValue {
        SecretValue::new(uri.clone(), Bytes::from_static(payload.as_bytes()), Utc::now())
    }

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        value: SecretValue,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, ResolveResult<SecretValue>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn pinned_values_are_served_from_cache() {
        let cache = SecretCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let target = uri("secret://p/secrets/s/versions/1");

        for _ in 0..3 {
            let value = cache
                .get_or_fetch(
                    &target,
                    counting_fetch(&calls, value_for(&target, "v1"), Duration::ZERO),
                )
                .await
                .unwrap();
            assert_eq!(value.value(), &Bytes::from_static(b"v1"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn latest_is_never_stored() {
        let cache = SecretCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let target = uri("secret://p/secrets/s/versions/latest");

        for _ in 0..2 {
            cache
                .get_or_fetch(
                    &target,
                    counting_fetch(&calls, value_for(&target, "v"), Duration::ZERO),
                )
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_lookups_share_one_fetch() {
        let cache = Arc::new(SecretCache::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let target = uri("secret://p/secrets/s/versions/2");

        let lookups = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            let fetch = counting_fetch(&calls, value_for(&target, "v2"), Duration::from_millis(20));
            let target = target.clone();
            async move { cache.get_or_fetch(&target, fetch).await }
        });
        let results = futures::future::join_all(lookups).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().coalesced, 7);
    }

    #[tokio::test]
    async fn errors_are_not_stored() {
        let cache = SecretCache::default();
        let target = uri("secret://p/secrets/s/versions/1");
        let failing = {
            let target = target.clone();
            move || async move { Err(ResolveError::NotFound { uri: target }) }.boxed()
        };
        assert!(cache.get_or_fetch(&target, failing).await.is_err());
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expires_pinned_entries() {
        let cache = SecretCache::new(CacheConfig::new().with_ttl(Duration::from_millis(50)));
        let calls = Arc::new(AtomicUsize::new(0));
        let target = uri("secret://p/secrets/s/versions/1");

        let fetch = || counting_fetch(&calls, value_for(&target, "v1"), Duration::ZERO);
        cache.get_or_fetch(&target, fetch()).await.unwrap();
        cache.get_or_fetch(&target, fetch()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(75)).await;
        cache.get_or_fetch(&target, fetch()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_oldest() {
        let cache = SecretCache::new(CacheConfig::new().with_capacity(NonZeroUsize::new(2).unwrap()));
        let calls = Arc::new(AtomicUsize::new(0));

        for version in 1..=3 {
            let target = uri(&format!("secret://p/secrets/s/versions/{version}"));
            cache
                .get_or_fetch(
                    &target,
                    counting_fetch(&calls, value_for(&target, "v"), Duration::ZERO),
                )
                .await
                .unwrap();
            tokio::time::advance(Duration::from_millis(1)).await;
        }
        assert_eq!(cache.stats().entries, 2);

        let first = uri("secret://p/secrets/s/versions/1");
        cache
            .get_or_fetch(&first, counting_fetch(&calls, value_for(&first, "v"), Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_fetch_is_restarted() {
        let cache = SecretCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let target = uri("secret://p/secrets/s/versions/1");

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            cache.get_or_fetch(
                &target,
                counting_fetch(&calls, value_for(&target, "v1"), Duration::from_secs(10)),
            ),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cache.stats().in_flight, 0);

        let value = cache
            .get_or_fetch(
                &target,
                counting_fetch(&calls, value_for(&target, "v1"), Duration::ZERO),
            )
            .await
            .unwrap();
        assert_eq!(value.value(), &Bytes::from_static(b"v1"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_drops_entries() {
        let cache = SecretCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let target = uri("secret://p/secrets/s/versions/1");
        cache
            .get_or_fetch(&target, counting_fetch(&calls, value_for(&target, "v1"), Duration::ZERO))
            .await
            .unwrap();
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }
}
