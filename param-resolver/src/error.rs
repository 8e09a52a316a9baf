//! Error types for secret stores and the resolver.

use param_primitives::{Identity, SecretUri};
use thiserror::Error;

/// Errors reported by a secret store backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The secret or the requested version does not exist.
    #[error("secret `{uri}` not found")]
    NotFound {
        /// Requested resource.
        uri: SecretUri,
    },
    /// The credentials lack read permission on the secret.
    #[error("`{identity}` may not read `{uri}`")]
    AccessDenied {
        /// Requested resource.
        uri: SecretUri,
        /// Identity the credentials belong to.
        identity: Identity,
    },
    /// Network or availability failure; the call may succeed later.
    #[error("secret store unavailable: {reason}")]
    Transient {
        /// Human-readable reason describing the failure.
        reason: String,
    },
}

impl StoreError {
    /// Helper to construct transient errors from string-like values.
    #[must_use]
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Classified failure of a resolution attempt.
///
/// Cloneable so that one in-flight fetch can hand its outcome to every waiter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The secret or version does not exist.
    #[error("secret `{uri}` not found")]
    NotFound {
        /// Requested resource.
        uri: SecretUri,
    },
    /// The store refused the identity's credentials.
    #[error("`{identity}` may not read `{uri}`")]
    AccessDenied {
        /// Requested resource.
        uri: SecretUri,
        /// Identity whose credentials were refused.
        identity: Identity,
    },
    /// Network, availability, or timeout failure; the only retryable class.
    #[error("transient failure resolving `{uri}`: {reason}")]
    Transient {
        /// Requested resource.
        uri: SecretUri,
        /// Human-readable reason describing the failure.
        reason: String,
    },
}

impl ResolveError {
    /// Returns true when a caller may retry the resolution.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub(crate) fn from_store(uri: &SecretUri, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { uri } => Self::NotFound { uri },
            StoreError::AccessDenied { uri, identity } => Self::AccessDenied { uri, identity },
            StoreError::Transient { reason } => Self::Transient {
                uri: uri.clone(),
                reason,
            },
        }
    }
}

/// Result type alias for resolver operations.
pub type ResolveResult<T> = Result<T, ResolveError>;
