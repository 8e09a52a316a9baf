//! Roles, resource patterns, and role bindings.

use std::fmt::{self, Display, Formatter};

use param_primitives::{Identity, SCHEME, SecretUri};
use serde::{Deserialize, Serialize};

use crate::engine::{PolicyError, PolicyResult};

/// Roles that can be bound to an identity on a secret resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May read secret payloads.
    SecretAccessor,
    /// May read metadata only; payload access is not included.
    SecretViewer,
    /// Full control, including payload access.
    SecretAdmin,
}

impl Role {
    /// Returns true when the role carries the payload read capability.
    #[must_use]
    pub const fn can_read_payload(self) -> bool {
        matches!(self, Self::SecretAccessor | Self::SecretAdmin)
    }

    /// Returns the role label used in logs and decisions.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SecretAccessor => "secret_accessor",
            Self::SecretViewer => "secret_viewer",
            Self::SecretAdmin => "secret_admin",
        }
    }
}

/// Resources a binding applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourcePattern {
    /// Every version of one secret: `secret://{project}/secrets/{secret}`.
    Secret {
        /// Owning project.
        project: String,
        /// Secret name.
        secret: String,
    },
    /// Every secret of a project: `secret://{project}/secrets/*`.
    Project {
        /// Project name.
        project: String,
    },
}

impl ResourcePattern {
    /// Pattern covering every version of the secret named by `uri`.
    #[must_use]
    pub fn secret(uri: &SecretUri) -> Self {
        Self::Secret {
            project: uri.project().to_owned(),
            secret: uri.secret().to_owned(),
        }
    }

    /// Pattern covering every secret of `project`.
    #[must_use]
    pub fn project(project: impl Into<String>) -> Self {
        Self::Project {
            project: project.into(),
        }
    }

    /// Parses `secret://{project}/secrets/{secret}` or `secret://{project}/secrets/*`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidBinding`] for any other shape.
    pub fn parse(input: &str) -> PolicyResult<Self> {
        let raw = input.trim();
        if let Some(project) = raw
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.strip_suffix("/secrets/*"))
        {
            // Reuse URI validation for the project component.
            let probe = format!("{SCHEME}{project}/secrets/probe/versions/latest");
            SecretUri::parse(&probe)
                .map_err(|_| PolicyError::InvalidBinding("invalid project in resource pattern"))?;
            return Ok(Self::project(project));
        }

        let uri = SecretUri::parse(&format!("{raw}/versions/latest"))
            .map_err(|_| PolicyError::InvalidBinding("invalid resource pattern"))?;
        Ok(Self::secret(&uri))
    }

    /// Returns true when the pattern covers `uri`, whatever its version.
    #[must_use]
    pub fn covers(&self, uri: &SecretUri) -> bool {
        match self {
            Self::Secret { project, secret } => {
                project == uri.project() && secret == uri.secret()
            }
            Self::Project { project } => project == uri.project(),
        }
    }
}

impl Display for ResourcePattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret { project, secret } => {
                write!(f, "{SCHEME}{project}/secrets/{secret}")
            }
            Self::Project { project } => write!(f, "{SCHEME}{project}/secrets/*"),
        }
    }
}

impl TryFrom<String> for ResourcePattern {
    type Error = PolicyError;

    fn try_from(value: String) -> PolicyResult<Self> {
        Self::parse(&value)
    }
}

impl From<ResourcePattern> for String {
    fn from(value: ResourcePattern) -> Self {
        value.to_string()
    }
}

/// Grants `role` on `resource` to `identity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleBinding {
    identity: Identity,
    resource: ResourcePattern,
    role: Role,
}

impl RoleBinding {
    /// Creates a binding.
    #[must_use]
    pub fn new(identity: Identity, resource: ResourcePattern, role: Role) -> Self {
        Self {
            identity,
            resource,
            role,
        }
    }

    /// Bound identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Bound resource pattern.
    #[must_use]
    pub fn resource(&self) -> &ResourcePattern {
        &self.resource
    }

    /// Bound role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn grants_read(&self, identity: &Identity, uri: &SecretUri) -> bool {
        self.role.can_read_payload() && &self.identity == identity && self.resource.covers(uri)
    }
}

/// Result of an idempotent grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The binding was added.
    Granted,
    /// An identical binding already existed; nothing changed.
    AlreadyHeld,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(raw: &str) -> SecretUri {
        SecretUri::parse(raw).unwrap()
    }

    #[test]
    fn patterns_cover_versions() {
        let pattern = ResourcePattern::parse("secret://proj/secrets/api").unwrap();
        assert!(pattern.covers(&uri("secret://proj/secrets/api/versions/1")));
        assert!(pattern.covers(&uri("secret://proj/secrets/api/versions/latest")));
        assert!(!pattern.covers(&uri("secret://proj/secrets/other/versions/1")));

        let project = ResourcePattern::parse("secret://proj/secrets/*").unwrap();
        assert!(project.covers(&uri("secret://proj/secrets/other/versions/9")));
        assert!(!project.covers(&uri("secret://elsewhere/secrets/api/versions/1")));
    }

    #[test]
    fn pattern_round_trips_and_rejects_garbage() {
        for raw in ["secret://proj/secrets/api", "secret://proj/secrets/*"] {
            assert_eq!(ResourcePattern::parse(raw).unwrap().to_string(), raw);
        }
        assert!(ResourcePattern::parse("secret://proj/secrets/api/versions/1").is_err());
        assert!(ResourcePattern::parse("proj/api").is_err());
        assert!(ResourcePattern::parse("secret:// /secrets/*").is_err());
    }

    #[test]
    fn viewer_cannot_read_payload() {
        assert!(Role::SecretAccessor.can_read_payload());
        assert!(Role::SecretAdmin.can_read_payload());
        assert!(!Role::SecretViewer.can_read_payload());
    }
}
