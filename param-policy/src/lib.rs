//! Read-access gating for secret references.
//!
//! Gates answer one question before a secret is resolved: may this identity
//! read this secret? Granting access is an administrative operation kept off
//! the render path.

#![warn(missing_docs, clippy::pedantic)]

pub mod contracts;
pub mod decision;
pub mod engine;
pub mod integrations;

pub use contracts::{GrantOutcome, ResourcePattern, Role, RoleBinding};
pub use decision::AccessDecision;
pub use engine::{AccessGate, GrantTableGate, PolicyError, PolicyResult};
pub use integrations::{AuthorizationService, RemoteAccessGate};
