//! Secret store contract and an in-memory implementation.

use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroU64;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use param_primitives::{Identity, SecretUri, VersionSelector};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Credentials a fetch is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCredentials {
    identity: Identity,
}

impl StoreCredentials {
    /// Credentials acting as `identity`.
    #[must_use]
    pub fn for_identity(identity: Identity) -> Self {
        Self { identity }
    }

    /// Identity the credentials belong to.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

/// Narrow contract of a secret store backend.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Reads the payload of `uri` at `version` using `credentials`.
    async fn get_secret(
        &self,
        uri: &SecretUri,
        credentials: &StoreCredentials,
        version: VersionSelector,
    ) -> StoreResult<Bytes>;
}

/// Result of an idempotent secret creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The secret did not exist and was created.
    Created,
    /// The secret already existed; nothing changed.
    AlreadyExists,
}

#[derive(Debug, Clone)]
struct StoredVersion {
    payload: Bytes,
    enabled: bool,
}

/// Process-local secret store with versioning.
///
/// Besides serving reads it can simulate the failure classes of a remote
/// store: per-identity denial, scripted transient failures, and latency. Every
/// call to [`SecretStore::get_secret`] is counted.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<BTreeMap<(String, String), Vec<StoredVersion>>>,
    denied: RwLock<HashSet<Identity>>,
    transient_failures: AtomicUsize,
    fetches: AtomicUsize,
    latency: Option<Duration>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every read by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Creates an empty secret unless it already exists.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn create_secret(&self, project: &str, secret: &str) -> CreateOutcome {
        let mut guard = self.secrets.write().expect("secret store poisoned");
        let key = (project.to_owned(), secret.to_owned());
        if guard.contains_key(&key) {
            return CreateOutcome::AlreadyExists;
        }
        guard.insert(key, Vec::new());
        CreateOutcome::Created
    }

    /// Appends a new version, creating the secret when missing, and returns
    /// its version number. The new version becomes `latest`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn add_version(&self, project: &str, secret: &str, payload: impl Into<Bytes>) -> NonZeroU64 {
        let mut guard = self.secrets.write().expect("secret store poisoned");
        let versions = guard
            .entry((project.to_owned(), secret.to_owned()))
            .or_default();
        versions.push(StoredVersion {
            payload: payload.into(),
            enabled: true,
        });
        let count = u64::try_from(versions.len()).unwrap_or(u64::MAX);
        NonZeroU64::new(count).unwrap_or(NonZeroU64::MIN)
    }

    /// Disables a version so reads report it as not found. Returns whether the
    /// version existed.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn disable_version(&self, project: &str, secret: &str, version: NonZeroU64) -> bool {
        let mut guard = self.secrets.write().expect("secret store poisoned");
        let Some(versions) = guard.get_mut(&(project.to_owned(), secret.to_owned())) else {
            return false;
        };
        let Some(stored) = usize::try_from(version.get() - 1)
            .ok()
            .and_then(|index| versions.get_mut(index))
        else {
            return false;
        };
        stored.enabled = false;
        true
    }

    /// Makes every read by `identity` fail with access denied.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn deny_identity(&self, identity: Identity) {
        self.denied.write().expect("secret store poisoned").insert(identity);
    }

    /// Makes the next `count` reads fail transiently.
    pub fn fail_next(&self, count: usize) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Number of reads served or attempted so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn take_transient_failure(&self) -> bool {
        self.transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    fn lookup(&self, uri: &SecretUri, version: VersionSelector) -> StoreResult<Bytes> {
        let guard = self.secrets.read().expect("secret store poisoned");
        let not_found = || StoreError::NotFound { uri: uri.clone() };
        let versions = guard
            .get(&(uri.project().to_owned(), uri.secret().to_owned()))
            .ok_or_else(not_found)?;

        let stored = match version {
            VersionSelector::Latest => versions.last(),
            VersionSelector::Pinned(number) => usize::try_from(number.get() - 1)
                .ok()
                .and_then(|index| versions.get(index)),
        }
        .ok_or_else(not_found)?;

        if !stored.enabled {
            return Err(not_found());
        }
        Ok(stored.payload.clone())
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get_secret(
        &self,
        uri: &SecretUri,
        credentials: &StoreCredentials,
        version: VersionSelector,
    ) -> StoreResult<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        debug!(%uri, identity = %credentials.identity(), "in-memory secret read");

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.take_transient_failure() {
            return Err(StoreError::transient("injected transient failure"));
        }

        let denied = self
            .denied
            .read()
            .expect("secret store poisoned")
            .contains(credentials.identity());
        if denied {
            return Err(StoreError::AccessDenied {
                uri: uri.clone(),
                identity: credentials.identity().clone(),
            });
        }

        self.lookup(uri, version)
    }
}
