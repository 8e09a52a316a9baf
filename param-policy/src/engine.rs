//! Access gate trait and in-process grant table.

use std::sync::RwLock;

use async_trait::async_trait;
use param_primitives::{Identity, SecretUri};
use thiserror::Error;
use tracing::{debug, info};

use crate::contracts::{GrantOutcome, ResourcePattern, Role, RoleBinding};
use crate::decision::AccessDecision;

/// Errors surfaced by access gates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Binding or resource pattern failed validation.
    #[error("invalid role binding: {0}")]
    InvalidBinding(&'static str),
    /// Authorization backend could not be reached or timed out.
    #[error("authorization backend unavailable: {reason}")]
    Unavailable {
        /// Human-readable explanation for logging and operators.
        reason: String,
    },
    /// Authorization backend returned a permanent error.
    #[error("authorization backend failure: {reason}")]
    Backend {
        /// Human-readable explanation for logging and operators.
        reason: String,
    },
}

impl PolicyError {
    /// Convenience constructor for transient backend failures.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for permanent backend failures.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Decides whether an identity may read a secret before it is resolved.
///
/// Implementations never mutate permissions.
#[async_trait]
pub trait AccessGate: Send + Sync {
    /// Checks whether `identity` holds a read capability on `resource`.
    async fn authorize(
        &self,
        identity: &Identity,
        resource: &SecretUri,
    ) -> PolicyResult<AccessDecision>;
}

/// In-memory authorization model backed by role bindings.
///
/// Bindings are added through [`GrantTableGate::grant`], the administrative
/// path used during provisioning; the render path only calls
/// [`AccessGate::authorize`].
#[derive(Debug, Default)]
pub struct GrantTableGate {
    bindings: RwLock<Vec<RoleBinding>>,
}

impl GrantTableGate {
    /// Constructs an empty table that denies everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `role` on `resource` to `identity`. Granting a held role is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the internal binding lock has been poisoned.
    pub fn grant(&self, identity: Identity, resource: ResourcePattern, role: Role) -> GrantOutcome {
        let binding = RoleBinding::new(identity, resource, role);
        let mut guard = self.bindings.write().expect("grant table poisoned");
        if guard.contains(&binding) {
            debug!(
                identity = %binding.identity(),
                resource = %binding.resource(),
                role = role.label(),
                "role already held"
            );
            return GrantOutcome::AlreadyHeld;
        }
        info!(
            identity = %binding.identity(),
            resource = %binding.resource(),
            role = role.label(),
            "role granted"
        );
        guard.push(binding);
        GrantOutcome::Granted
    }

    /// Removes a binding, returning whether it existed.
    ///
    /// # Panics
    ///
    /// Panics if the internal binding lock has been poisoned.
    pub fn revoke(&self, identity: &Identity, resource: &ResourcePattern, role: Role) -> bool {
        let mut guard = self.bindings.write().expect("grant table poisoned");
        let before = guard.len();
        guard.retain(|binding| {
            !(binding.identity() == identity
                && binding.resource() == resource
                && binding.role() == role)
        });
        guard.len() != before
    }

    /// Returns a snapshot of all bindings in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal binding lock has been poisoned.
    #[must_use]
    pub fn bindings(&self) -> Vec<RoleBinding> {
        self.bindings.read().expect("grant table poisoned").clone()
    }
}

#[async_trait]
impl AccessGate for GrantTableGate {
    async fn authorize(
        &self,
        identity: &Identity,
        resource: &SecretUri,
    ) -> PolicyResult<AccessDecision> {
        let guard = self.bindings.read().expect("grant table poisoned");
        if let Some(binding) = guard
            .iter()
            .find(|binding| binding.grants_read(identity, resource))
        {
            let reason = format!("{} on {}", binding.role().label(), binding.resource());
            return Ok(AccessDecision::allow(
                identity.clone(),
                resource.clone(),
                reason,
            ));
        }

        debug!(%identity, %resource, "no binding grants read access");
        Ok(AccessDecision::deny(
            identity.clone(),
            resource.clone(),
            format!("{identity} lacks secret read access on {}", resource.secret_resource()),
        ))
    }
}
