//! Verifier Module: the sole authority on whether a candidate passes
//!
//! # Pipeline
//!
//! ```text
//! write candidate + tests to a fresh temp dir → run test command (timeout)
//!     → analysis gates (Generate / Fix only)
//! ```
//!
//! Every failure mode, including a timeout or a missing test runner, comes
//! back as a failing [`ValidationResult`] rather than an error.

pub mod analysis;
pub mod pipeline;
pub mod report;
pub mod sandbox;

pub use analysis::{
    parse_analysis_output, AnalysisGate, AnalysisGateConfig, AnalysisReport, CommandAnalysisGate,
};
pub use pipeline::ValidationPipeline;
pub use report::{
    truncate_output, GateOutcome, GateResult, ValidationReport, ValidationResult,
    TIMEOUT_ERROR_TEXT, TRANSPORT_ERROR_PREFIX,
};
pub use sandbox::{CandidateValidator, SandboxConfig, SandboxValidator};
