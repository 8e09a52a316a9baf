//! Shared error definitions for render primitives.

use thiserror::Error;

/// Result alias used throughout the render primitives.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The provided identity string failed validation.
    #[error("invalid identity `{identity}`: {reason}")]
    InvalidIdentity {
        /// The offending identity string.
        identity: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Secret resource identifier failed validation.
    #[error("invalid secret uri `{uri}`: {reason}")]
    InvalidSecretUri {
        /// The offending URI string.
        uri: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Document path was not a valid JSON pointer.
    #[error("invalid document path `{path}`: {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Human-readable reason for rejection.
        reason: &'static str,
    },

    /// Document bytes could not be decoded as JSON.
    #[error("invalid config document: {reason}")]
    InvalidDocument {
        /// Decoder message.
        reason: String,
    },
}

impl Error {
    pub(crate) fn secret_uri(uri: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSecretUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }
}
