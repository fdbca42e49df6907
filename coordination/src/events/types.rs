//! Event types for pipeline runs
//!
//! Published in state-machine order for each run; consumers (UI, logs)
//! never influence the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::router::endpoint_pool::Tier;
use crate::router::task_classifier::TaskCategory;

/// Unique identifier for a pipeline run
pub type RunId = String;

/// Characters kept from free text carried in events.
pub const PREVIEW_CHARS: usize = 200;

/// Shorten free text for an event payload.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// All pipeline status events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A run was accepted and classified
    RunStarted {
        run_id: RunId,
        objective_preview: String,
        category: TaskCategory,
        fingerprint: String,
        timestamp: DateTime<Utc>,
    },

    PlanningStarted {
        run_id: RunId,
        timestamp: DateTime<Utc>,
    },

    PlanningCompleted {
        run_id: RunId,
        strategy_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A candidate was produced (initially or by an escalation attempt)
    GenerationCompleted {
        run_id: RunId,
        /// 0 for the initial candidate
        attempt: u32,
        candidate_bytes: usize,
        /// Whether the sanitizer changed the raw text
        sanitized: bool,
        timestamp: DateTime<Utc>,
    },

    TestsGenerated {
        run_id: RunId,
        attempt: u32,
        suite_bytes: usize,
        /// The previous suite was kept because the candidate did not change
        reused: bool,
        timestamp: DateTime<Utc>,
    },

    ValidationPassed {
        run_id: RunId,
        attempt: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    ValidationFailed {
        run_id: RunId,
        attempt: u32,
        error_preview: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An escalation call is about to be made
    EscalationAttempt {
        run_id: RunId,
        attempt: u32,
        max_attempts: u32,
        tier: Tier,
        timestamp: DateTime<Utc>,
    },

    RunSucceeded {
        run_id: RunId,
        attempts: usize,
        timestamp: DateTime<Utc>,
    },

    RunExhausted {
        run_id: RunId,
        attempts: usize,
        last_error_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// Planning failed or the run was cancelled
    RunAborted {
        run_id: RunId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    DriftDetected {
        run_id: RunId,
        category: TaskCategory,
        failure_rate: f64,
        samples: usize,
        timestamp: DateTime<Utc>,
    },

    /// An endpoint crossed the failure threshold (not run-scoped)
    EndpointTripped {
        tier: Tier,
        address: String,
        consecutive_failures: u32,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RunStarted { timestamp, .. }
            | Self::PlanningStarted { timestamp, .. }
            | Self::PlanningCompleted { timestamp, .. }
            | Self::GenerationCompleted { timestamp, .. }
            | Self::TestsGenerated { timestamp, .. }
            | Self::ValidationPassed { timestamp, .. }
            | Self::ValidationFailed { timestamp, .. }
            | Self::EscalationAttempt { timestamp, .. }
            | Self::RunSucceeded { timestamp, .. }
            | Self::RunExhausted { timestamp, .. }
            | Self::RunAborted { timestamp, .. }
            | Self::DriftDetected { timestamp, .. }
            | Self::EndpointTripped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::PlanningStarted { .. } => "planning_started",
            Self::PlanningCompleted { .. } => "planning_completed",
            Self::GenerationCompleted { .. } => "generation_completed",
            Self::TestsGenerated { .. } => "tests_generated",
            Self::ValidationPassed { .. } => "validation_passed",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::EscalationAttempt { .. } => "escalation_attempt",
            Self::RunSucceeded { .. } => "run_succeeded",
            Self::RunExhausted { .. } => "run_exhausted",
            Self::RunAborted { .. } => "run_aborted",
            Self::DriftDetected { .. } => "drift_detected",
            Self::EndpointTripped { .. } => "endpoint_tripped",
        }
    }

    /// Get the run ID if this event is run-scoped
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::PlanningStarted { run_id, .. }
            | Self::PlanningCompleted { run_id, .. }
            | Self::GenerationCompleted { run_id, .. }
            | Self::TestsGenerated { run_id, .. }
            | Self::ValidationPassed { run_id, .. }
            | Self::ValidationFailed { run_id, .. }
            | Self::EscalationAttempt { run_id, .. }
            | Self::RunSucceeded { run_id, .. }
            | Self::RunExhausted { run_id, .. }
            | Self::RunAborted { run_id, .. }
            | Self::DriftDetected { run_id, .. } => Some(run_id),
            Self::EndpointTripped { .. } => None,
        }
    }

    /// Whether this event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunSucceeded { .. } | Self::RunExhausted { .. } | Self::RunAborted { .. }
        )
    }

    /// Generate a new unique run ID
    pub fn new_run_id() -> RunId {
        uuid::Uuid::new_v4().to_string()
    }
}
