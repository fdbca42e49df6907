//! Escalation: bounded retry with accumulating context
//!
//! This module is the bookkeeping half: a pure state machine plus the
//! ordered attempt log. The inference-driving loop lives in the pipeline
//! crate and only calls into this.
//!
//! # State Machine
//!
//! ```text
//! Idle
//!   │ initial candidate validated
//!   ├─ pass ──────────────────────────────► Succeeded
//!   ▼ fail
//! Attempting(1)
//!   │ escalation tier → sanitize → regenerate tests → validate
//!   ├─ pass ──────────────────────────────► Succeeded
//!   ├─ fail, n < max ─► Attempting(n + 1)
//!   └─ fail, n == max ────────────────────► Exhausted
//! ```
//!
//! Each attempt's context carries the previous attempt's error and the full
//! failure history, never just the original error.

pub mod engine;
pub mod state;

pub use engine::{
    EscalationEngine, EscalationError, EscalationEvent, EscalationPhase, DEFAULT_MAX_ATTEMPTS,
};
pub use state::{ContextSnapshot, EscalationAttempt, EscalationLog};
