//! Pipeline error taxonomy with retry classification.
//!
//! Only two things end a run unsuccessfully: a planning failure (surfaced as
//! [`PipelineError::Planning`]) and an exhausted escalation budget (an
//! ordinary outcome, not an error). Everything else is recovered inside the
//! run. Callers can query `retry_category()` without string matching.
//!
//! | Category      | Retriable | Raised by |
//! |---------------|-----------|-----------|
//! | Transient     | yes       | planning transport failures |
//! | InvalidOutput | yes       | empty strategy |
//! | Cancelled     | no        | cancellation token |
//! | Configuration | no        | bad config, zero escalation budget |

use std::fmt;

use coordination::escalation::EscalationError;
use coordination::router::PoolError;
use thiserror::Error;

/// Classification used by callers to decide whether to resubmit a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Backends were unreachable; the same run may succeed later.
    Transient,
    /// A backend answered with something unusable.
    InvalidOutput,
    /// Explicitly cancelled by the caller. Terminal.
    Cancelled,
    /// The pipeline is misconfigured. Terminal until fixed.
    Configuration,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient | Self::InvalidOutput)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::InvalidOutput => write!(f, "invalid_output"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// A backend call failed after the one allowed retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("No endpoints available: {0}")]
    NoEndpoints(#[from] PoolError),

    #[error("Request to {address} timed out after {secs}s")]
    Timeout { address: String, secs: u64 },

    #[error("Request to {address} failed: {message}")]
    Request { address: String, message: String },

    #[error("{address} returned HTTP {status}: {body}")]
    Status {
        address: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {address}: {message}")]
    InvalidResponse { address: String, message: String },
}

impl TransportError {
    /// Address the failing call went to, if one was selected.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::NoEndpoints(_) => None,
            Self::Timeout { address, .. }
            | Self::Request { address, .. }
            | Self::Status { address, .. }
            | Self::InvalidResponse { address, .. } => Some(address),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    /// Both calls (initial + retry) failed.
    #[error("Planning backend unreachable: {0}")]
    Transport(#[from] TransportError),

    #[error("Planner returned an empty strategy")]
    EmptyStrategy,
}

/// Errors that end a run without an outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("Run cancelled before {stage}")]
    Cancelled { stage: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The escalation log refused a transition. Indicates a bug or a zero budget.
    #[error("Escalation error: {0}")]
    Escalation(#[from] EscalationError),
}

impl PipelineError {
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    /// Classify this error for retry logic.
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Planning(PlanningError::Transport(_)) => RetryCategory::Transient,
            Self::Planning(PlanningError::EmptyStrategy) => RetryCategory::InvalidOutput,
            Self::Cancelled { .. } => RetryCategory::Cancelled,
            Self::Configuration(_) | Self::Escalation(_) => RetryCategory::Configuration,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::router::Tier;

    #[test]
    fn planning_transport_is_transient() {
        let err = PipelineError::from(PlanningError::Transport(TransportError::Timeout {
            address: "http://a".into(),
            secs: 30,
        }));
        assert_eq!(err.retry_category(), RetryCategory::Transient);
        assert!(err.is_retriable());
    }

    #[test]
    fn cancelled_is_terminal() {
        let err = PipelineError::cancelled("generation");
        assert!(!err.is_retriable());
        assert_eq!(err.to_string(), "Run cancelled before generation");
    }

    #[test]
    fn configuration_is_terminal() {
        assert!(!PipelineError::Configuration("no endpoints".into()).is_retriable());
    }

    #[test]
    fn transport_error_address() {
        let err = TransportError::from(PoolError::NoEndpoints(Tier::Planning));
        assert!(err.address().is_none());
        let err = TransportError::Status {
            address: "http://b".into(),
            status: 503,
            body: "overloaded".into(),
        };
        assert_eq!(err.address(), Some("http://b"));
        assert_eq!(err.to_string(), "http://b returned HTTP 503: overloaded");
    }
}
