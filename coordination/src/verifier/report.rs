//! Validation report types
//!
//! [`ValidationResult`] is the single verdict the pipeline acts on.
//! [`GateResult`] records what each individual gate said on the way there.

use serde::{Deserialize, Serialize};

/// `error_text` reported when a validation run exceeds its wall-clock budget.
pub const TIMEOUT_ERROR_TEXT: &str = "timeout";

/// Prefix on `error_text` when the failure came from an unreachable backend
/// rather than from running the candidate.
pub const TRANSPORT_ERROR_PREFIX: &str = "transport:";

/// Verdict for one Candidate/TestSuite pair. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether every gate passed
    pub passed: bool,
    /// Captured output of the failing gate (empty on success)
    pub error_text: String,
    /// Wall-clock time across all gates
    pub duration_ms: u64,
}

impl ValidationResult {
    pub fn passed(duration_ms: u64) -> Self {
        Self {
            passed: true,
            error_text: String::new(),
            duration_ms,
        }
    }

    pub fn failed(error_text: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            passed: false,
            error_text: error_text.into(),
            duration_ms,
        }
    }

    /// Failure from running past the timeout.
    pub fn timed_out(duration_ms: u64) -> Self {
        Self::failed(TIMEOUT_ERROR_TEXT, duration_ms)
    }

    /// Failure standing in for a candidate or suite that could not be
    /// produced because the backend was unreachable.
    pub fn transport_failure(message: impl std::fmt::Display) -> Self {
        Self::failed(format!("{TRANSPORT_ERROR_PREFIX} {message}"), 0)
    }

    pub fn is_timeout(&self) -> bool {
        !self.passed && self.error_text == TIMEOUT_ERROR_TEXT
    }

    pub fn is_transport_failure(&self) -> bool {
        !self.passed && self.error_text.starts_with(TRANSPORT_ERROR_PREFIX)
    }
}

/// Outcome of a single validation gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    /// Gate passed successfully
    Passed,
    /// Gate failed
    Failed,
    /// Gate was not run (an earlier gate failed or the category opts out)
    Skipped,
}

impl GateOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl std::fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "PASS"),
            Self::Failed => write!(f, "FAIL"),
            Self::Skipped => write!(f, "SKIP"),
        }
    }
}

/// Result of a single validation gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    /// Gate name ("sandbox", or the analysis tool name)
    pub gate: String,
    pub outcome: GateOutcome,
    pub duration_ms: u64,
    /// Issues reported by an analysis gate
    #[serde(default)]
    pub issues_found: u32,
    /// Captured output, truncated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_excerpt: Option<String>,
}

/// Full record of a validation run: the verdict plus per-gate detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub result: ValidationResult,
    pub gates: Vec<GateResult>,
}

impl ValidationReport {
    /// Build the verdict from gate results: the first failing gate decides.
    pub fn from_gates(gates: Vec<GateResult>) -> Self {
        let duration_ms = gates.iter().map(|g| g.duration_ms).sum();
        let result = match gates.iter().find(|g| g.outcome == GateOutcome::Failed) {
            Some(gate) => {
                ValidationResult::failed(gate.output_excerpt.clone().unwrap_or_default(), duration_ms)
            }
            None => ValidationResult::passed(duration_ms),
        };
        Self { result, gates }
    }

    /// One-line summary for logging
    pub fn summary(&self) -> String {
        let gates: Vec<String> = self
            .gates
            .iter()
            .map(|g| format!("{}={}", g.gate, g.outcome))
            .collect();
        format!(
            "passed={} duration={}ms [{}]",
            self.result.passed,
            self.result.duration_ms,
            gates.join(" ")
        )
    }
}

/// Truncate captured output to at most `max_bytes`, keeping the tail.
///
/// Test runners print the failing assertion last, so the tail is the part
/// worth keeping. Cuts on a char boundary.
pub fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut start = output.len() - max_bytes;
    while !output.is_char_boundary(start) {
        start += 1;
    }
    format!("...[truncated]\n{}", &output[start..])
}
