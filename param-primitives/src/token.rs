//! Reference tokens discovered inside configuration documents.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::uri::SecretUri;

/// A secret reference found at a specific node of a document.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ReferenceToken {
    path: String,
    uri: SecretUri,
}

impl ReferenceToken {
    /// Creates a token for the node at `path` (an RFC 6901 JSON pointer).
    #[must_use]
    pub fn new(path: impl Into<String>, uri: SecretUri) -> Self {
        Self {
            path: path.into(),
            uri,
        }
    }

    /// JSON pointer to the node holding the reference.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The referenced secret.
    #[must_use]
    pub fn uri(&self) -> &SecretUri {
        &self.uri
    }
}

impl Display for ReferenceToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.path, self.uri)
    }
}

/// Appends one escaped reference segment to a JSON pointer.
#[must_use]
pub fn push_pointer_segment(pointer: &str, segment: &str) -> String {
    let escaped = segment.replace('~', "~0").replace('/', "~1");
    format!("{pointer}/{escaped}")
}
