//! Secret resource identifiers.

use std::fmt::{self, Display, Formatter};
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scheme prefix for every secret resource identifier.
pub const SCHEME: &str = "secret://";

const SECRETS_SEGMENT: &str = "secrets";
const VERSIONS_SEGMENT: &str = "versions";
const LATEST: &str = "latest";
const MAX_COMPONENT_LEN: usize = 255;

/// Version qualifier carried by a secret URI.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum VersionSelector {
    /// Whatever version is newest at fetch time.
    Latest,
    /// An exact, immutable version.
    Pinned(NonZeroU64),
}

impl VersionSelector {
    /// Returns `true` when the selector names an exact version.
    #[must_use]
    pub const fn is_pinned(self) -> bool {
        matches!(self, Self::Pinned(_))
    }

    fn parse(uri: &str, raw: &str) -> Result<Self> {
        if raw == LATEST {
            return Ok(Self::Latest);
        }
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::secret_uri(
                uri,
                "version must be `latest` or a positive integer",
            ));
        }
        if raw.starts_with('0') {
            return Err(Error::secret_uri(
                uri,
                "version number cannot be zero or have leading zeros",
            ));
        }
        let number = raw
            .parse::<u64>()
            .ok()
            .and_then(NonZeroU64::new)
            .ok_or_else(|| Error::secret_uri(uri, "version number out of range"))?;
        Ok(Self::Pinned(number))
    }
}

impl Display for VersionSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str(LATEST),
            Self::Pinned(version) => Display::fmt(version, f),
        }
    }
}

/// Identifies one version (or the latest version) of a secret.
///
/// Canonical form: `secret://{project}/secrets/{secret}/versions/{version}`.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretUri {
    project: String,
    secret: String,
    version: VersionSelector,
}

impl SecretUri {
    /// Builds a URI from its components.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSecretUri`] when a component is empty, too long,
    /// or contains characters outside `[A-Za-z0-9._-]`.
    pub fn new(
        project: impl Into<String>,
        secret: impl Into<String>,
        version: VersionSelector,
    ) -> Result<Self> {
        let project = project.into();
        let secret = secret.into();
        let display = format!("{SCHEME}{project}/{SECRETS_SEGMENT}/{secret}");
        validate_component(&display, &project, "project")?;
        validate_component(&display, &secret, "secret")?;
        Ok(Self {
            project,
            secret,
            version,
        })
    }

    /// Parses the canonical string form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSecretUri`] when the input is not of the form
    /// `secret://{project}/secrets/{secret}/versions/{latest|N}`.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        let Some(path) = raw.strip_prefix(SCHEME) else {
            return Err(Error::secret_uri(raw, "uri must start with `secret://`"));
        };

        let segments: Vec<&str> = path.split('/').collect();
        let [project, secrets, secret, versions, version] = segments.as_slice() else {
            return Err(Error::secret_uri(
                raw,
                "expected `{project}/secrets/{secret}/versions/{version}`",
            ));
        };
        if *secrets != SECRETS_SEGMENT {
            return Err(Error::secret_uri(raw, "second segment must be `secrets`"));
        }
        if *versions != VERSIONS_SEGMENT {
            return Err(Error::secret_uri(raw, "fourth segment must be `versions`"));
        }

        validate_component(raw, project, "project")?;
        validate_component(raw, secret, "secret")?;
        let version = VersionSelector::parse(raw, version)?;

        Ok(Self {
            project: (*project).to_owned(),
            secret: (*secret).to_owned(),
            version,
        })
    }

    /// Returns the project component.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Returns the secret name component.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Returns the version qualifier.
    #[must_use]
    pub const fn version(&self) -> VersionSelector {
        self.version
    }

    /// Returns `true` when the URI names an exact version.
    #[must_use]
    pub const fn is_pinned(&self) -> bool {
        self.version.is_pinned()
    }

    /// Returns a copy of this URI addressing a different version.
    #[must_use]
    pub fn with_version(&self, version: VersionSelector) -> Self {
        Self {
            project: self.project.clone(),
            secret: self.secret.clone(),
            version,
        }
    }

    /// Returns the version-less resource name, e.g. `secret://proj/secrets/api-key`.
    #[must_use]
    pub fn secret_resource(&self) -> String {
        format!("{SCHEME}{}/{SECRETS_SEGMENT}/{}", self.project, self.secret)
    }
}

impl Display for SecretUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME}{}/{SECRETS_SEGMENT}/{}/{VERSIONS_SEGMENT}/{}",
            self.project, self.secret, self.version
        )
    }
}

impl FromStr for SecretUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SecretUri {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SecretUri> for String {
    fn from(value: SecretUri) -> Self {
        value.to_string()
    }
}

fn validate_component(uri: &str, value: &str, field: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::secret_uri(uri, format!("{field} cannot be empty")));
    }
    if value.len() > MAX_COMPONENT_LEN {
        return Err(Error::secret_uri(
            uri,
            format!("{field} length must be <= {MAX_COMPONENT_LEN}"),
        ));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::secret_uri(
            uri,
            format!("{field} must contain only alphanumeric, dash, underscore, or dot"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pinned_and_latest() {
        let pinned = SecretUri::parse("secret://proj/secrets/weather-key/versions/3").unwrap();
        assert_eq!(pinned.project(), "proj");
        assert_eq!(pinned.secret(), "weather-key");
        assert_eq!(
            pinned.version(),
            VersionSelector::Pinned(NonZeroU64::new(3).unwrap())
        );
        assert!(pinned.is_pinned());

        let latest = SecretUri::parse("secret://proj/secrets/weather-key/versions/latest").unwrap();
        assert_eq!(latest.version(), VersionSelector::Latest);
        assert!(!latest.is_pinned());
    }

    #[test]
    fn display_is_canonical() {
        let raw = "secret://my-proj/secrets/db_password/versions/12";
        assert_eq!(SecretUri::parse(raw).unwrap().to_string(), raw);
        assert_eq!(
            SecretUri::parse(raw).unwrap().secret_resource(),
            "secret://my-proj/secrets/db_password"
        );
    }

    #[test]
    fn rejects_malformed_uris() {
        for raw in [
            "",
            "secrets://proj/secrets/a/versions/1",
            "secret://proj/secrets/a",
            "secret://proj/keys/a/versions/1",
            "secret://proj/secrets/a/revisions/1",
            "secret:///secrets/a/versions/1",
            "secret://proj/secrets/a b/versions/1",
            "secret://proj/secrets/a/versions/",
            "secret://proj/secrets/a/versions/0",
            "secret://proj/secrets/a/versions/007",
            "secret://proj/secrets/a/versions/-1",
            "secret://proj/secrets/a/versions/newest",
            "secret://proj/secrets/a/versions/99999999999999999999999",
            "secret://proj/secrets/a/versions/1/extra",
        ] {
            assert!(SecretUri::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn with_version_keeps_resource() {
        let uri = SecretUri::parse("secret://p/secrets/s/versions/latest").unwrap();
        let pinned = uri.with_version(VersionSelector::Pinned(NonZeroU64::MIN));
        assert_eq!(pinned.to_string(), "secret://p/secrets/s/versions/1");
    }

    #[test]
    fn serde_uses_string_form() {
        let uri: SecretUri =
            serde_json::from_str("\"secret://p/secrets/s/versions/2\"").unwrap();
        assert_eq!(
            serde_json::to_string(&uri).unwrap(),
            "\"secret://p/secrets/s/versions/2\""
        );
    }
}
