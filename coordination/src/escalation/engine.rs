//! Escalation Engine: the transition function of the escalation state machine
//!
//! Pure and deterministic: no LLM calls, no clocks. The controller that
//! drives inference feeds validation verdicts in and acts on the phase that
//! comes out.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default escalation budget per run.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Where a run is in the escalation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum EscalationPhase {
    /// No candidate validated yet.
    Idle,
    /// The next escalation call will be attempt `attempt`.
    Attempting { attempt: u32 },
    /// A candidate passed. Terminal.
    Succeeded,
    /// The budget is spent and the last candidate still fails. Terminal.
    Exhausted,
}

impl EscalationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted)
    }
}

impl std::fmt::Display for EscalationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Attempting { attempt } => write!(f, "attempting({attempt})"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationEvent {
    /// Verdict on the initially generated candidate.
    InitialValidated { passed: bool },
    /// Verdict on the candidate produced by the current attempt.
    AttemptValidated { passed: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscalationError {
    #[error("Invalid escalation transition: {event:?} in phase {phase}")]
    InvalidTransition {
        phase: EscalationPhase,
        event: EscalationEvent,
    },
    #[error("max_attempts must be at least 1")]
    ZeroBudget,
}

/// Budget-aware transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEngine {
    max_attempts: u32,
}

impl Default for EscalationEngine {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl EscalationEngine {
    pub fn new(max_attempts: u32) -> Result<Self, EscalationError> {
        if max_attempts == 0 {
            return Err(EscalationError::ZeroBudget);
        }
        Ok(Self { max_attempts })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Apply `event` to `phase`.
    ///
    /// - `Idle` + initial pass → `Succeeded`; initial fail → `Attempting(1)`
    /// - `Attempting(n)` + pass → `Succeeded`
    /// - `Attempting(n)` + fail, `n < max` → `Attempting(n + 1)`
    /// - `Attempting(n)` + fail, `n == max` → `Exhausted`
    pub fn transition(
        &self,
        phase: EscalationPhase,
        event: EscalationEvent,
    ) -> Result<EscalationPhase, EscalationError> {
        match (phase, event) {
            (EscalationPhase::Idle, EscalationEvent::InitialValidated { passed: true }) => {
                Ok(EscalationPhase::Succeeded)
            }
            (EscalationPhase::Idle, EscalationEvent::InitialValidated { passed: false }) => {
                Ok(EscalationPhase::Attempting { attempt: 1 })
            }
            (EscalationPhase::Attempting { .. }, EscalationEvent::AttemptValidated { passed: true }) => {
                Ok(EscalationPhase::Succeeded)
            }
            (
                EscalationPhase::Attempting { attempt },
                EscalationEvent::AttemptValidated { passed: false },
            ) => {
                if attempt >= self.max_attempts {
                    Ok(EscalationPhase::Exhausted)
                } else {
                    Ok(EscalationPhase::Attempting {
                        attempt: attempt + 1,
                    })
                }
            }
            (phase, event) => Err(EscalationError::InvalidTransition { phase, event }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail() -> EscalationEvent {
        EscalationEvent::AttemptValidated { passed: false }
    }

    #[test]
    fn test_initial_pass_succeeds_without_attempts() {
        let engine = EscalationEngine::default();
        let phase = engine
            .transition(EscalationPhase::Idle, EscalationEvent::InitialValidated { passed: true })
            .unwrap();
        assert_eq!(phase, EscalationPhase::Succeeded);
    }

    #[test]
    fn test_failures_walk_to_exhausted() {
        let engine = EscalationEngine::new(3).unwrap();
        let mut phase = engine
            .transition(EscalationPhase::Idle, EscalationEvent::InitialValidated { passed: false })
            .unwrap();
        assert_eq!(phase, EscalationPhase::Attempting { attempt: 1 });
        phase = engine.transition(phase, fail()).unwrap();
        assert_eq!(phase, EscalationPhase::Attempting { attempt: 2 });
        phase = engine.transition(phase, fail()).unwrap();
        assert_eq!(phase, EscalationPhase::Attempting { attempt: 3 });
        phase = engine.transition(phase, fail()).unwrap();
        assert_eq!(phase, EscalationPhase::Exhausted);
    }

    #[test]
    fn test_terminal_phases_reject_events() {
        let engine = EscalationEngine::default();
        for phase in [EscalationPhase::Succeeded, EscalationPhase::Exhausted] {
            assert!(engine.transition(phase, fail()).is_err());
        }
        assert!(engine.transition(EscalationPhase::Idle, fail()).is_err());
        assert!(engine
            .transition(
                EscalationPhase::Attempting { attempt: 1 },
                EscalationEvent::InitialValidated { passed: true }
            )
            .is_err());
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert_eq!(EscalationEngine::new(0), Err(EscalationError::ZeroBudget));
    }

    #[test]
    fn test_attempts_never_exceed_budget() {
        for max in 1..=6 {
            let engine = EscalationEngine::new(max).unwrap();
            let mut phase = engine
                .transition(EscalationPhase::Idle, EscalationEvent::InitialValidated { passed: false })
                .unwrap();
            let mut attempts = 0;
            while let EscalationPhase::Attempting { attempt } = phase {
                attempts += 1;
                assert!(attempt <= max);
                phase = engine.transition(phase, fail()).unwrap();
            }
            assert_eq!(attempts, max);
            assert_eq!(phase, EscalationPhase::Exhausted);
        }
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(EscalationPhase::Attempting { attempt: 2 }.to_string(), "attempting(2)");
        assert!(EscalationPhase::Exhausted.is_terminal());
        assert!(!EscalationPhase::Idle.is_terminal());
    }
}
