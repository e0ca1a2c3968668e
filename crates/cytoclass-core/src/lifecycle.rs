//! Per-request state machine
//!
//! `Received → Validated → Invoked → Normalized → Persisted → Responded`,
//! with `Errored` reachable from any non-terminal state. There are no back
//! edges.

use crate::error::ErrorKind;
use crate::types::RequestId;
use std::fmt;

/// State of one prediction request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Validated,
    Invoked,
    Normalized,
    Persisted,
    Responded,
    /// Terminal failure, carrying the originating error kind
    Errored(ErrorKind),
}

impl RequestState {
    /// Successor on the happy path; terminal states have none
    #[inline]
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Received => Some(Self::Validated),
            Self::Validated => Some(Self::Invoked),
            Self::Invoked => Some(Self::Normalized),
            Self::Normalized => Some(Self::Persisted),
            Self::Persisted => Some(Self::Responded),
            Self::Responded | Self::Errored(_) => None,
        }
    }

    /// Check for a terminal state
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Responded | Self::Errored(_))
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => f.write_str("received"),
            Self::Validated => f.write_str("validated"),
            Self::Invoked => f.write_str("invoked"),
            Self::Normalized => f.write_str("normalized"),
            Self::Persisted => f.write_str("persisted"),
            Self::Responded => f.write_str("responded"),
            Self::Errored(kind) => write!(f, "errored({kind})"),
        }
    }
}

/// Tracks one request through its states
#[derive(Debug)]
pub struct RequestLifecycle {
    id: RequestId,
    state: RequestState,
}

impl RequestLifecycle {
    /// Start a request in `Received`
    #[inline]
    #[must_use]
    pub fn start(id: RequestId) -> Self {
        tracing::debug!(request_id = %id, state = %RequestState::Received, "request state");
        Self {
            id,
            state: RequestState::Received,
        }
    }

    /// Request identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Move along the happy path; a no-op once terminal
    pub fn advance(&mut self) -> RequestState {
        if let Some(next) = self.state.next() {
            tracing::debug!(request_id = %self.id, from = %self.state, to = %next, "request state");
            self.state = next;
        }
        self.state
    }

    /// Enter `Errored`; a no-op once terminal
    pub fn fail(&mut self, kind: ErrorKind) -> RequestState {
        if !self.state.is_terminal() {
            tracing::debug!(request_id = %self.id, from = %self.state, %kind, "request failed");
            self.state = RequestState::Errored(kind);
        }
        self.state
    }
}
