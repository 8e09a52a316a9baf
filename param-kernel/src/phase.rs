//! Per-render state machine.

use param_primitives::RenderId;
use thiserror::Error;
use tracing::debug;

/// Phases a single render invocation moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// Scanning the document for reference tokens.
    Parse,
    /// Checking read access for every referenced secret.
    Authorize,
    /// Fetching secret payloads.
    Resolve,
    /// Writing payloads into a copy of the document.
    Substitute,
    /// Rendered document handed back to the caller.
    Done,
    /// Render aborted; no document is returned.
    Failed,
}

impl RenderPhase {
    /// Returns `true` once the render has finished, successfully or not.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Events that drive phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Parsing found at least one token.
    TokensFound,
    /// Parsing found nothing to substitute.
    NoTokens,
    /// Every token was authorized.
    Authorized,
    /// Every token was resolved.
    Resolved,
    /// Every token was substituted.
    Substituted,
    /// Any failure, including cancellation.
    Fail,
}

/// Phase tracker for one render.
#[derive(Debug, Clone, Copy)]
pub struct RenderProgress {
    render_id: RenderId,
    phase: RenderPhase,
}

impl RenderProgress {
    /// Starts tracking a render in the [`RenderPhase::Parse`] phase.
    #[must_use]
    pub const fn new(render_id: RenderId) -> Self {
        Self {
            render_id,
            phase: RenderPhase::Parse,
        }
    }

    /// Returns the render identifier.
    #[must_use]
    pub const fn render_id(&self) -> RenderId {
        self.render_id
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// Applies an event, returning the resulting phase.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::InvalidTransition`] when the event is not allowed
    /// from the current phase.
    pub fn transition(&mut self, event: PhaseEvent) -> PhaseResult<RenderPhase> {
        let next = match (self.phase, event) {
            (RenderPhase::Parse, PhaseEvent::TokensFound) => Some(RenderPhase::Authorize),
            (RenderPhase::Parse, PhaseEvent::NoTokens)
            | (RenderPhase::Substitute, PhaseEvent::Substituted) => Some(RenderPhase::Done),
            (RenderPhase::Authorize, PhaseEvent::Authorized) => Some(RenderPhase::Resolve),
            (RenderPhase::Resolve, PhaseEvent::Resolved) => Some(RenderPhase::Substitute),
            (phase, PhaseEvent::Fail) if !phase.is_terminal() => Some(RenderPhase::Failed),
            _ => None,
        };

        let Some(next_phase) = next else {
            return Err(PhaseError::InvalidTransition {
                render_id: self.render_id,
                from: self.phase,
                event,
            });
        };

        debug!(
            render_id = %self.render_id,
            from = ?self.phase,
            to = ?next_phase,
            ?event,
            "render phase transition"
        );
        self.phase = next_phase;
        Ok(self.phase)
    }
}

/// Errors emitted by the phase tracker.
#[derive(Debug, Error)]
pub enum PhaseError {
    /// Transition was not permitted from the current phase.
    #[error("invalid render transition from {from:?} via {event:?} for render {render_id}")]
    InvalidTransition {
        /// Render whose transition failed.
        render_id: RenderId,
        /// Phase prior to the attempted transition.
        from: RenderPhase,
        /// Event that triggered the failure.
        event: PhaseEvent,
    },
}

/// Result alias used for phase operations.
pub type PhaseResult<T> = Result<T, PhaseError>;
