//! Coordination Library
//!
//! Deterministic building blocks for the tiered code-generation pipeline.
//! Nothing in here talks to a model; the pipeline crate drives inference and
//! calls into these pieces for every decision and every verdict.
//!
//! # Components
//!
//! - [`router`]: per-tier endpoint pool (round-robin, skip tripped) and the
//!   keyword task classifier
//! - [`sanitizer`]: strips fences and prose from generated text
//! - [`verifier`]: sandboxed test runs plus static-analysis gates; the sole
//!   authority on pass/fail
//! - [`escalation`]: the Idle → Attempting → Succeeded/Exhausted state machine
//!   and its attempt log
//! - [`drift`]: rolling failure rate per task category
//! - [`events`]: ordered run status events over a broadcast bus
//! - [`artifact`] / [`registry`]: fingerprints, paired test suites, and the
//!   store finished runs are handed to
//!
//! # Flow
//!
//! ```text
//! objective ─► classify ─► plan ─► generate ─► sanitize ─► tests ─► validate
//!                                                                    │
//!                     ┌──────────────── fail ◄───────────────────────┤
//!                     ▼                                              │ pass
//!                escalate (≤ max_attempts, cumulative context)       ▼
//!                                                                 registry
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod artifact;
pub mod drift;
pub mod escalation;
pub mod events;
pub mod registry;
pub mod router;
pub mod sanitizer;
pub mod verifier;

pub use artifact::{digest, fingerprint, TestSuite};
pub use drift::{DriftConfig, DriftMonitor, DriftSnapshot, SharedDriftMonitor};
pub use escalation::{
    ContextSnapshot, EscalationAttempt, EscalationEngine, EscalationError, EscalationLog,
    EscalationPhase, DEFAULT_MAX_ATTEMPTS,
};
pub use events::{EventBus, EventBusExt, EventFilter, PipelineEvent, SharedEventBus};
pub use registry::{
    ArtifactRegistry, DirectoryRegistry, InMemoryRegistry, RegistryError, RegistryRecord,
    SharedRegistry,
};
pub use router::{
    classify, classify_detailed, Classification, EndpointPool, EndpointRecord, PoolError,
    SharedEndpointPool, TaskCategory, Tier,
};
pub use sanitizer::{needs_sanitizing, sanitize};
pub use verifier::{
    AnalysisGate, CandidateValidator, CommandAnalysisGate, SandboxConfig, SandboxValidator,
    ValidationPipeline, ValidationReport, ValidationResult,
};
