//! Gate state machine.
//!
//! ```text
//! Received -> Authenticating -> TenantResolving -> ContextProvisioned -> Handling -> Completed
//!                   |                  |
//!                   +---> Rejected <---+
//! ```

use tracing::debug;

use super::error::GateError;

/// Where a request is in the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateStage {
    Received,
    Authenticating,
    TenantResolving,
    ContextProvisioned,
    Handling,
    Completed,
    Rejected,
}

impl GateStage {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(self, next: GateStage) -> bool {
        use GateStage::{
            Authenticating, Completed, ContextProvisioned, Handling, Received, Rejected,
            TenantResolving,
        };
        matches!(
            (self, next),
            (Received, Authenticating)
                | (Authenticating, TenantResolving | Rejected)
                | (TenantResolving, ContextProvisioned | Rejected)
                | (ContextProvisioned, Handling)
                | (Handling, Completed)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Authenticating => "authenticating",
            Self::TenantResolving => "tenant_resolving",
            Self::ContextProvisioned => "context_provisioned",
            Self::Handling => "handling",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

/// Tracks one request's stage and refuses illegal transitions.
#[derive(Debug)]
pub struct StageTracker {
    current: GateStage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: GateStage::Received,
        }
    }

    #[must_use]
    pub fn current(&self) -> GateStage {
        self.current
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InternalFailure`] when the transition is not
    /// allowed; the stage is left unchanged.
    pub fn advance(&mut self, next: GateStage) -> Result<(), GateError> {
        if !self.current.can_transition_to(next) {
            return Err(GateError::InternalFailure(format!(
                "illegal gate transition {} -> {}",
                self.current.as_str(),
                next.as_str()
            )));
        }
        debug!(from = self.current.as_str(), to = next.as_str(), "gate stage");
        self.current = next;
        tracing::Span::current().record("stage", next.as_str());
        Ok(())
    }

    /// Moves to [`GateStage::Rejected`] and hands `err` back for returning.
    pub fn reject(&mut self, err: GateError) -> GateError {
        match self.advance(GateStage::Rejected) {
            Ok(()) => err,
            Err(misuse) => misuse,
        }
    }
}
