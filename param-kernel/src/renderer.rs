//! Document rendering: parse, authorize, resolve, substitute.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use param_policy::{AccessDecision, AccessGate, PolicyError};
use param_primitives::{ConfigDocument, Identity, ReferenceToken, RenderId, SecretUri};
use param_resolver::{SecretResolver, SecretValue};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::{RenderError, RenderResult};
use crate::parser::ReferenceParser;
use crate::phase::{PhaseEvent, RenderProgress};
use crate::scheduler::{SchedulerResult, TaskScheduler, join_fail_fast};

/// Per-call knobs for a render.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    call_timeout: Option<Duration>,
    cancellation: CancellationToken,
}

impl RenderOptions {
    /// No timeout override and a fresh cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds every authorization and store call made by the render.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Uses `token` to cancel the render cooperatively.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the per-call timeout override.
    #[must_use]
    pub const fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Returns the cancellation token observed by the render.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Renders configuration documents by replacing secret references with
/// their payloads.
///
/// A render either returns a fully substituted copy of the input or an error;
/// the input document is never modified. Every distinct secret is authorized
/// before any is fetched, and a single denial fails the whole render.
pub struct PayloadRenderer {
    parser: ReferenceParser,
    gate: Arc<dyn AccessGate>,
    resolver: Arc<SecretResolver>,
    scheduler: TaskScheduler,
    call_timeout: Option<Duration>,
}

impl fmt::Debug for PayloadRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadRenderer")
            .field("parser", &self.parser)
            .field("gate", &"dyn AccessGate")
            .field("resolver", &self.resolver)
            .field("scheduler", &self.scheduler)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl PayloadRenderer {
    /// Creates a renderer with the default parser and scheduler.
    #[must_use]
    pub fn new(gate: Arc<dyn AccessGate>, resolver: Arc<SecretResolver>) -> Self {
        Self {
            parser: ReferenceParser::new(),
            gate,
            resolver,
            scheduler: TaskScheduler::default(),
            call_timeout: None,
        }
    }

    /// Replaces the reference parser.
    #[must_use]
    pub fn with_parser(mut self, parser: ReferenceParser) -> Self {
        self.parser = parser;
        self
    }

    /// Replaces the scheduler bounding concurrent calls.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Timeout applied when [`RenderOptions`] does not carry one.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Returns the reference parser.
    #[must_use]
    pub fn parser(&self) -> &ReferenceParser {
        &self.parser
    }

    /// Returns the shared resolver.
    #[must_use]
    pub fn resolver(&self) -> &Arc<SecretResolver> {
        &self.resolver
    }

    /// Renders `document` as `identity` with default options.
    ///
    /// # Errors
    ///
    /// See [`PayloadRenderer::render_with`].
    pub async fn render(
        &self,
        document: &ConfigDocument,
        identity: &Identity,
    ) -> RenderResult<ConfigDocument> {
        self.render_with(document, identity, &RenderOptions::default())
            .await
    }

    /// Renders `document` as `identity`.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered:
    /// [`RenderError::MalformedReference`] for bad tokens,
    /// [`RenderError::AccessDenied`] when the gate or the store refuses a secret,
    /// [`RenderError::NotFound`] for missing secrets,
    /// [`RenderError::Transient`] for unavailability and timeouts,
    /// [`RenderError::Cancelled`] when `options` is cancelled, and
    /// [`RenderError::InvalidPayload`] for payloads that are not UTF-8.
    pub async fn render_with(
        &self,
        document: &ConfigDocument,
        identity: &Identity,
        options: &RenderOptions,
    ) -> RenderResult<ConfigDocument> {
        let render_id = RenderId::random();
        let span = info_span!("render", %render_id, %identity);

        async move {
            let mut progress = RenderProgress::new(render_id);
            let outcome = self.drive(&mut progress, document, identity, options).await;
            if let Err(err) = &outcome {
                let phase = progress.phase();
                if !phase.is_terminal() {
                    progress.transition(PhaseEvent::Fail)?;
                }
                warn!(?phase, kind = ?err.kind(), error = %err, "render failed");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        progress: &mut RenderProgress,
        document: &ConfigDocument,
        identity: &Identity,
        options: &RenderOptions,
    ) -> RenderResult<ConfigDocument> {
        let cancel = options.cancellation();
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        let tokens = self.parser.parse(document)?;
        if tokens.is_empty() {
            progress.transition(PhaseEvent::NoTokens)?;
            debug!("no references found");
            return Ok(document.clone());
        }
        progress.transition(PhaseEvent::TokensFound)?;

        let uris = distinct_uris(&tokens);
        let timeout = options.call_timeout().or(self.call_timeout);
        debug!(tokens = tokens.len(), secrets = uris.len(), "references parsed");

        self.authorize_all(&uris, identity, timeout, cancel).await?;
        progress.transition(PhaseEvent::Authorized)?;

        let values = self.resolve_all(&uris, identity, timeout, cancel).await?;
        progress.transition(PhaseEvent::Resolved)?;

        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        let rendered = substitute(document, &tokens, &values)?;
        progress.transition(PhaseEvent::Substituted)?;

        info!(tokens = tokens.len(), secrets = uris.len(), "render complete");
        Ok(rendered)
    }

    async fn authorize_all(
        &self,
        uris: &[SecretUri],
        identity: &Identity,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> RenderResult<()> {
        let checks = uris.iter().map(|uri| {
            let gate = Arc::clone(&self.gate);
            let identity = identity.clone();
            let uri = uri.clone();
            async move {
                let call = gate.authorize(&identity, &uri);
                let outcome = match timeout {
                    Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                        Err(PolicyError::unavailable(format!(
                            "authorization timed out after {limit:?}"
                        )))
                    }),
                    None => call.await,
                };
                outcome.map_err(|err| RenderError::from_policy(&identity, &uri, err))
            }
        });

        let decisions = join_fail_fast(self.spawn_all(checks)?, cancel).await?;
        if let Some(denied) = decisions.iter().find(|decision| !decision.is_allowed()) {
            return Err(denied_error(denied));
        }
        debug!(secrets = decisions.len(), "access granted");
        Ok(())
    }

    async fn resolve_all(
        &self,
        uris: &[SecretUri],
        identity: &Identity,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> RenderResult<Vec<SecretValue>> {
        let fetches = uris.iter().map(|uri| {
            let resolver = Arc::clone(&self.resolver);
            let identity = identity.clone();
            let uri = uri.clone();
            async move {
                resolver
                    .resolve_with_timeout(&uri, &identity, timeout)
                    .await
                    .map_err(RenderError::from)
            }
        });

        join_fail_fast(self.spawn_all(fetches)?, cancel).await
    }

    fn spawn_all<F, T>(
        &self,
        tasks: impl IntoIterator<Item = F>,
    ) -> RenderResult<Vec<JoinHandle<SchedulerResult<RenderResult<T>>>>>
    where
        F: Future<Output = RenderResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut handles = Vec::new();
        for task in tasks {
            match self.scheduler.spawn(task) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in &handles {
                        handle.abort();
                    }
                    return Err(err.into());
                }
            }
        }
        Ok(handles)
    }
}

fn distinct_uris(tokens: &[ReferenceToken]) -> Vec<SecretUri> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .map(ReferenceToken::uri)
        .filter(|uri| seen.insert(*uri))
        .cloned()
        .collect()
}

fn denied_error(decision: &AccessDecision) -> RenderError {
    warn!(resource = %decision.resource(), reason = decision.reason(), "access denied");
    RenderError::AccessDenied {
        resource: decision.resource().clone(),
        identity: decision.identity().clone(),
        reason: decision.reason().to_owned(),
    }
}

fn substitute(
    document: &ConfigDocument,
    tokens: &[ReferenceToken],
    values: &[SecretValue],
) -> RenderResult<ConfigDocument> {
    let by_uri: HashMap<&SecretUri, &SecretValue> =
        values.iter().map(|value| (value.uri(), value)).collect();

    let mut rendered = document.clone();
    for token in tokens {
        let value = by_uri.get(token.uri()).ok_or_else(|| {
            RenderError::internal(format!("no resolved value for `{}`", token.uri()))
        })?;
        let text = value.as_str().ok_or_else(|| RenderError::InvalidPayload {
            path: token.path().to_owned(),
            resource: token.uri().clone(),
        })?;
        rendered
            .replace_string(token.path(), text.to_owned())
            .map_err(|err| RenderError::internal(err.to_string()))?;
    }
    Ok(rendered)
}
