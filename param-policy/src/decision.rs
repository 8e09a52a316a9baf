//! Access decisions returned by gates.

use param_primitives::{Identity, SecretUri};
use serde::{Deserialize, Serialize};

/// Outcome of one authorization check; produced per resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    identity: Identity,
    resource: SecretUri,
    allowed: bool,
    reason: String,
}

impl AccessDecision {
    /// Returns an allow decision with an explanatory reason.
    #[must_use]
    pub fn allow(identity: Identity, resource: SecretUri, reason: impl Into<String>) -> Self {
        Self {
            identity,
            resource,
            allowed: true,
            reason: reason.into(),
        }
    }

    /// Returns a deny decision with an explanatory reason.
    #[must_use]
    pub fn deny(identity: Identity, resource: SecretUri, reason: impl Into<String>) -> Self {
        Self {
            identity,
            resource,
            allowed: false,
            reason: reason.into(),
        }
    }

    /// Identity the decision applies to.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Resource the decision applies to.
    #[must_use]
    pub fn resource(&self) -> &SecretUri {
        &self.resource
    }

    /// Returns true when the identity may read the resource.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Human-readable explanation of the decision.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_helpers_work() {
        let identity = Identity::new("user:a@example.com").unwrap();
        let uri = SecretUri::parse("secret://p/secrets/s/versions/1").unwrap();

        let allow = AccessDecision::allow(identity.clone(), uri.clone(), "bound");
        assert!(allow.is_allowed());
        assert_eq!(allow.reason(), "bound");

        let deny = AccessDecision::deny(identity, uri.clone(), "no binding");
        assert!(!deny.is_allowed());
        assert_eq!(deny.resource(), &uri);
    }
}
