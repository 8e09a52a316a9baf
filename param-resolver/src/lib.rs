//! Secret resolution for reference rendering.
//!
//! A [`SecretResolver`] reads secret payloads from a [`SecretStore`] on behalf
//! of an identity, classifies failures, and shares results through a
//! single-flight [`SecretCache`].

#![warn(missing_docs, clippy::pedantic)]

pub mod cache;
pub mod error;
pub mod resolver;
pub mod store;

pub use cache::{CacheConfig, CacheStats, SecretCache};
pub use error::{ResolveError, ResolveResult, StoreError, StoreResult};
pub use resolver::{ResolverConfig, SecretResolver, SecretValue};
pub use store::{CreateOutcome, InMemorySecretStore, SecretStore, StoreCredentials};
