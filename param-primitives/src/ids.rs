//! Identifier types for callers and render invocations.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

const MAX_IDENTITY_LEN: usize = 256;

/// Principal on whose behalf a render reads secrets.
///
/// Identities are opaque strings such as `serviceAccount:renderer@proj.iam` or
/// `user:alice@example.com`; only emptiness, length and whitespace are checked.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Creates an identity after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the identity is empty, too long, or
    /// contains whitespace.
    pub fn new(identity: impl Into<String>) -> Result<Self, Error> {
        let identity = identity.into();
        if identity.is_empty() {
            return Err(Error::InvalidIdentity {
                identity,
                reason: "identity cannot be empty".into(),
            });
        }
        if identity.len() > MAX_IDENTITY_LEN {
            return Err(Error::InvalidIdentity {
                identity,
                reason: format!("identity length must be <= {MAX_IDENTITY_LEN}"),
            });
        }
        if identity.chars().any(char::is_whitespace) {
            return Err(Error::InvalidIdentity {
                identity,
                reason: "identity cannot contain whitespace".into(),
            });
        }
        Ok(Self(identity))
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

/// Unique identifier for a single render invocation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderId(Uuid);

impl RenderId {
    /// Generates a random render identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for RenderId {
    fn default() -> Self {
        Self::random()
    }
}

impl Display for RenderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_validation() {
        assert!(Identity::new("serviceAccount:renderer@proj.iam").is_ok());
        assert!(Identity::new("").is_err());
        assert!(Identity::new("user: bob").is_err());
        assert!(Identity::new("x".repeat(MAX_IDENTITY_LEN + 1)).is_err());
    }

    #[test]
    fn identity_serde_validates() {
        let parsed: Identity = serde_json::from_str("\"user:alice@example.com\"").unwrap();
        assert_eq!(parsed.as_str(), "user:alice@example.com");
        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
    }

    #[test]
    fn render_ids_are_unique() {
        assert_ne!(RenderId::random(), RenderId::random());
    }
}
