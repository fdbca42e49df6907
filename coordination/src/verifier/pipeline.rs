//! Validation Pipeline: sandboxed tests, then analysis gates
//!
//! ```text
//! sandbox (tests vs candidate) → analysis gate 1 → ... → analysis gate N
//! ```
//!
//! Fail-fast: once a gate fails, the rest are recorded as `Skipped`.
//! Analysis gates only run for categories that ask for them.

use crate::router::task_classifier::TaskCategory;
use crate::verifier::analysis::AnalysisGate;
use crate::verifier::report::{GateOutcome, GateResult, ValidationReport};
use crate::verifier::sandbox::CandidateValidator;
use std::sync::Arc;
use tracing::info;

/// Composes the candidate validator with optional analysis gates.
#[derive(Clone)]
pub struct ValidationPipeline {
    validator: Arc<dyn CandidateValidator>,
    gates: Vec<Arc<dyn AnalysisGate>>,
}

impl ValidationPipeline {
    pub fn new(validator: Arc<dyn CandidateValidator>) -> Self {
        Self {
            validator,
            gates: Vec::new(),
        }
    }

    /// Append an analysis gate; gates run in insertion order.
    pub fn with_gate(mut self, gate: Arc<dyn AnalysisGate>) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn gate_names(&self) -> Vec<&str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    fn skipped(name: &str) -> GateResult {
        GateResult {
            gate: name.to_string(),
            outcome: GateOutcome::Skipped,
            duration_ms: 0,
            issues_found: 0,
            output_excerpt: None,
        }
    }

    /// Validate one Candidate/TestSuite pair for `category`.
    pub async fn validate(
        &self,
        category: TaskCategory,
        candidate: &str,
        test_suite: &str,
    ) -> ValidationReport {
        let sandbox = self.validator.validate(candidate, test_suite).await;
        let mut gates = vec![GateResult {
            gate: "sandbox".to_string(),
            outcome: if sandbox.passed {
                GateOutcome::Passed
            } else {
                GateOutcome::Failed
            },
            duration_ms: sandbox.duration_ms,
            issues_found: 0,
            output_excerpt: (!sandbox.passed).then(|| sandbox.error_text.clone()),
        }];

        let mut blocked = !sandbox.passed || !category.runs_analysis_gates();
        for gate in &self.gates {
            if blocked {
                gates.push(Self::skipped(gate.name()));
                continue;
            }
            let result = gate.analyze(candidate).await;
            blocked = result.outcome == GateOutcome::Failed;
            gates.push(result);
        }

        let report = ValidationReport::from_gates(gates);
        info!(category = %category, summary = %report.summary(), "Validation finished");
        report
    }
}
