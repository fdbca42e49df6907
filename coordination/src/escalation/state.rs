//! Escalation State: the ordered attempt log for one run
//!
//! Each attempt stores the exact context it was given, so any attempt can be
//! replayed or inspected without reconstructing history.

use crate::escalation::engine::{
    EscalationEngine, EscalationError, EscalationEvent, EscalationPhase,
};
use crate::router::endpoint_pool::Tier;
use crate::verifier::report::ValidationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything an escalation call is given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub objective: String,
    pub strategy: String,
    /// Candidate that failed most recently
    pub prior_candidate: String,
    /// Error text of the most recent failure
    pub prior_error: String,
    /// Every error so far, oldest first (initial validation included)
    pub failure_history: Vec<String>,
    /// Capability names available to the run
    pub capabilities: Vec<String>,
}

/// Record of one escalation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationAttempt {
    /// 1-indexed
    pub attempt_number: u32,
    pub tier_used: Tier,
    pub context_snapshot: ContextSnapshot,
    pub resulting_candidate: String,
    pub resulting_validation: ValidationResult,
    pub started_at: DateTime<Utc>,
}

/// Ordered escalation history plus the current phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationLog {
    objective: String,
    strategy: String,
    capabilities: Vec<String>,
    engine: EscalationEngine,
    phase: EscalationPhase,
    initial_candidate: String,
    initial_validation: Option<ValidationResult>,
    attempts: Vec<EscalationAttempt>,
}

impl EscalationLog {
    pub fn new(
        objective: impl Into<String>,
        strategy: impl Into<String>,
        capabilities: Vec<String>,
        engine: EscalationEngine,
    ) -> Self {
        Self {
            objective: objective.into(),
            strategy: strategy.into(),
            capabilities,
            engine,
            phase: EscalationPhase::Idle,
            initial_candidate: String::new(),
            initial_validation: None,
            attempts: Vec::new(),
        }
    }

    /// Record the verdict on the initial candidate.
    pub fn begin(
        &mut self,
        candidate: impl Into<String>,
        validation: ValidationResult,
    ) -> Result<EscalationPhase, EscalationError> {
        let next = self.engine.transition(
            self.phase,
            EscalationEvent::InitialValidated {
                passed: validation.passed,
            },
        )?;
        self.initial_candidate = candidate.into();
        self.initial_validation = Some(validation);
        self.phase = next;
        Ok(next)
    }

    /// Context for the next attempt, or `None` when not attempting.
    ///
    /// `prior_error` is always the most recent failure: the initial
    /// validation's for attempt 1, the previous attempt's afterwards.
    pub fn next_context(&self) -> Option<ContextSnapshot> {
        if !matches!(self.phase, EscalationPhase::Attempting { .. }) {
            return None;
        }
        let validation = self.current_validation()?;
        Some(ContextSnapshot {
            objective: self.objective.clone(),
            strategy: self.strategy.clone(),
            prior_candidate: self.current_candidate().to_string(),
            prior_error: validation.error_text.clone(),
            failure_history: self.failure_history(),
            capabilities: self.capabilities.clone(),
        })
    }

    /// Record the outcome of the attempt that was given `context_snapshot`.
    pub fn record_attempt(
        &mut self,
        tier_used: Tier,
        context_snapshot: ContextSnapshot,
        resulting_candidate: impl Into<String>,
        resulting_validation: ValidationResult,
        started_at: DateTime<Utc>,
    ) -> Result<EscalationPhase, EscalationError> {
        let EscalationPhase::Attempting { attempt } = self.phase else {
            return Err(EscalationError::InvalidTransition {
                phase: self.phase,
                event: EscalationEvent::AttemptValidated {
                    passed: resulting_validation.passed,
                },
            });
        };
        let next = self.engine.transition(
            self.phase,
            EscalationEvent::AttemptValidated {
                passed: resulting_validation.passed,
            },
        )?;
        self.attempts.push(EscalationAttempt {
            attempt_number: attempt,
            tier_used,
            context_snapshot,
            resulting_candidate: resulting_candidate.into(),
            resulting_validation,
            started_at,
        });
        self.phase = next;
        Ok(next)
    }

    pub fn phase(&self) -> EscalationPhase {
        self.phase
    }

    pub fn max_attempts(&self) -> u32 {
        self.engine.max_attempts()
    }

    pub fn attempts(&self) -> &[EscalationAttempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<EscalationAttempt> {
        self.attempts
    }

    /// The candidate the run currently stands on.
    pub fn current_candidate(&self) -> &str {
        self.attempts
            .last()
            .map(|a| a.resulting_candidate.as_str())
            .unwrap_or(&self.initial_candidate)
    }

    /// The verdict on [`Self::current_candidate`].
    pub fn current_validation(&self) -> Option<&ValidationResult> {
        self.attempts
            .last()
            .map(|a| &a.resulting_validation)
            .or(self.initial_validation.as_ref())
    }

    /// Error texts of every failing validation, oldest first.
    pub fn failure_history(&self) -> Vec<String> {
        self.initial_validation
            .iter()
            .chain(self.attempts.iter().map(|a| &a.resulting_validation))
            .filter(|v| !v.passed)
            .map(|v| v.error_text.clone())
            .collect()
    }

    /// Get a summary for logging
    pub fn summary(&self) -> String {
        format!(
            "phase={} attempts={}/{} failures={}",
            self.phase,
            self.attempts.len(),
            self.engine.max_attempts(),
            self.failure_history().len(),
        )
    }
}
