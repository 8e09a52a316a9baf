//! Core shared types for secret-reference rendering.

#![warn(missing_docs, clippy::pedantic)]

mod document;
mod error;
mod ids;
mod token;
mod uri;

/// JSON configuration tree rendered by the kernel.
pub use document::ConfigDocument;
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Caller identities and render invocation identifiers.
pub use ids::{Identity, RenderId};
/// Reference tokens and JSON pointer helpers.
pub use token::{ReferenceToken, push_pointer_segment};
/// Secret resource identifiers.
pub use uri::{SCHEME, SecretUri, VersionSelector};
