//! Integrations with external authorization services.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use param_primitives::{Identity, SecretUri};

use crate::decision::AccessDecision;
use crate::engine::{AccessGate, PolicyError, PolicyResult};

/// Narrow contract of a remote authorization service.
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    /// Returns whether `identity` may read `resource`.
    async fn check_access(&self, identity: &Identity, resource: &SecretUri) -> PolicyResult<bool>;
}

/// Access gate adapter that delegates to a remote authorization service.
pub struct RemoteAccessGate<C>
where
    C: AuthorizationService + 'static,
{
    client: Arc<C>,
    timeout: Option<Duration>,
}

impl<C> Clone for RemoteAccessGate<C>
where
    C: AuthorizationService + 'static,
{
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            timeout: self.timeout,
        }
    }
}

impl<C> RemoteAccessGate<C>
where
    C: AuthorizationService + 'static,
{
    /// Creates a new remote gate using the provided client.
    #[must_use]
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Bounds every check by `timeout`; elapsed checks fail as unavailable.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl<C> AccessGate for RemoteAccessGate<C>
where
    C: AuthorizationService + 'static,
{
    async fn authorize(
        &self,
        identity: &Identity,
        resource: &SecretUri,
    ) -> PolicyResult<AccessDecision> {
        let check = self.client.check_access(identity, resource);
        let allowed = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, check).await.map_err(|_| {
                PolicyError::unavailable(format!("access check timed out after {limit:?}"))
            })??,
            None => check.await?,
        };

        Ok(if allowed {
            AccessDecision::allow(identity.clone(), resource.clone(), "authorization service allowed")
        } else {
            AccessDecision::deny(identity.clone(), resource.clone(), "authorization service denied")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticService(bool);

    #[async_trait]
    impl AuthorizationService for StaticService {
        async fn check_access(&self, _identity: &Identity, _resource: &SecretUri) -> PolicyResult<bool> {
            Ok(self.0)
        }
    }

    struct SlowService;

    #[async_trait]
    impl AuthorizationService for SlowService {
        async fn check_access(&self, _identity: &Identity, _resource: &SecretUri) -> PolicyResult<bool> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(true)
        }
    }

    fn args() -> (Identity, SecretUri) {
        (
            Identity::new("user:a").unwrap(),
            SecretUri::parse("secret://p/secrets/s/versions/1").unwrap(),
        )
    }

    #[tokio::test]
    async fn remote_gate_delegates_to_service() {
        let (identity, uri) = args();
        let allow = RemoteAccessGate::new(Arc::new(StaticService(true)));
        assert!(allow.authorize(&identity, &uri).await.unwrap().is_allowed());

        let deny = RemoteAccessGate::new(Arc::new(StaticService(false)));
        assert!(!deny.authorize(&identity, &uri).await.unwrap().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn remote_gate_times_out() {
        let (identity, uri) = args();
        let gate =
            RemoteAccessGate::new(Arc::new(SlowService)).with_timeout(Duration::from_millis(50));
        let err = gate.authorize(&identity, &uri).await.unwrap_err();
        assert!(matches!(err, PolicyError::Unavailable { .. }));
    }
}
