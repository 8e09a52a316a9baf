//! Render error taxonomy.

use param_policy::PolicyError;
use param_primitives::{Identity, SecretUri};
use param_resolver::ResolveError;
use thiserror::Error;

use crate::phase::PhaseError;
use crate::scheduler::SchedulerError;

/// Coarse classification used by callers to decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The document contains a bad reference; fix the document.
    MalformedReference,
    /// The identity may not read a referenced secret; grant and retry.
    AccessDenied,
    /// A referenced secret or version does not exist.
    NotFound,
    /// Network, availability, or timeout failure; retry with backoff.
    Transient,
    /// The caller cancelled the render.
    Cancelled,
    /// A secret payload cannot be placed into the document.
    InvalidPayload,
    /// Renderer misconfiguration.
    Configuration,
    /// Runtime failure inside the renderer itself.
    Internal,
}

/// Errors returned by a render. No partial document accompanies any of them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A node starts with the reference prefix but is not a valid reference.
    #[error("malformed reference at `{path}`: {reason}")]
    MalformedReference {
        /// JSON pointer of the offending node.
        path: String,
        /// Why the reference was rejected.
        reason: String,
    },
    /// The identity is not authorized to read a referenced secret.
    #[error("`{identity}` may not read `{resource}`: {reason}")]
    AccessDenied {
        /// Secret that was refused.
        resource: SecretUri,
        /// Identity the render ran as.
        identity: Identity,
        /// Explanation from the gate or the store.
        reason: String,
    },
    /// A referenced secret or version does not exist.
    #[error("secret `{resource}` not found")]
    NotFound {
        /// Missing secret.
        resource: SecretUri,
    },
    /// A store or authorization call failed transiently or timed out.
    #[error("transient failure: {reason}")]
    Transient {
        /// Secret being processed, when known.
        resource: Option<SecretUri>,
        /// Human-readable reason.
        reason: String,
    },
    /// The render was cancelled by the caller.
    #[error("render cancelled")]
    Cancelled,
    /// A secret payload is not valid UTF-8 text.
    #[error("secret `{resource}` referenced at `{path}` is not valid UTF-8")]
    InvalidPayload {
        /// JSON pointer of the node being substituted.
        path: String,
        /// Secret whose payload was rejected.
        resource: SecretUri,
    },
    /// Renderer configuration was invalid.
    #[error("invalid renderer configuration: {0}")]
    InvalidConfig(&'static str),
    /// Scheduler, task, or state machine failure.
    #[error("internal render failure: {reason}")]
    Internal {
        /// Human-readable reason.
        reason: String,
    },
}

impl RenderError {
    /// Returns the coarse error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedReference { .. } => ErrorKind::MalformedReference,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidPayload { .. } => ErrorKind::InvalidPayload,
            Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Only transient failures are eligible for retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub(crate) fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Maps an authorization backend failure. Unavailability is transient;
    /// any other failure denies access.
    pub(crate) fn from_policy(identity: &Identity, resource: &SecretUri, err: PolicyError) -> Self {
        match err {
            PolicyError::Unavailable { reason } => Self::Transient {
                resource: Some(resource.clone()),
                reason,
            },
            other => Self::AccessDenied {
                resource: resource.clone(),
                identity: identity.clone(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<ResolveError> for RenderError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound { uri } => Self::NotFound { resource: uri },
            ResolveError::AccessDenied { uri, identity } => Self::AccessDenied {
                resource: uri,
                identity,
                reason: "secret store refused the credentials".into(),
            },
            ResolveError::Transient { uri, reason } => Self::Transient {
                resource: Some(uri),
                reason,
            },
        }
    }
}

impl From<PhaseError> for RenderError {
    fn from(err: PhaseError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<SchedulerError> for RenderError {
    fn from(err: SchedulerError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Result alias for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn uri() -> SecretUri {
        SecretUri::parse("secret://p/secrets/s/versions/1").unwrap()
    }

    #[test]
    fn only_transient_is_retryable() {
        let transient = RenderError::Transient {
            resource: None,
            reason: "503".into(),
        };
        assert!(transient.is_retryable());
        assert_eq!(transient.kind(), ErrorKind::Transient);

        for err in [
            RenderError::Cancelled,
            RenderError::NotFound { resource: uri() },
            RenderError::MalformedReference {
                path: "/a".into(),
                reason: "bad".into(),
            },
        ] {
            assert!(!err.is_retryable(), "{err}");
        }
    }

    #[test]
    fn resolve_errors_keep_their_class() {
        let identity = Identity::new("user:a").unwrap();
        let denied: RenderError = ResolveError::AccessDenied {
            uri: uri(),
            identity,
        }
        .into();
        assert_eq!(denied.kind(), ErrorKind::AccessDenied);

        let missing: RenderError = ResolveError::NotFound { uri: uri() }.into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn policy_unavailability_is_transient() {
        let identity = Identity::new("user:a").unwrap();
        let err = RenderError::from_policy(&identity, &uri(), PolicyError::unavailable("timeout"));
        assert!(err.is_retryable());

        let err = RenderError::from_policy(&identity, &uri(), PolicyError::backend("bad request"));
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }
}
