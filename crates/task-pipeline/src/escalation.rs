//! Escalation Controller: drives the attempt loop on the escalation tier.
//!
//! The state machine and the attempt log live in `coordination::escalation`;
//! this module does the I/O for each step: call the escalation tier, sanitize,
//! pair a test suite, validate, and feed the verdict back into the log.

use chrono::Utc;
use coordination::artifact::TestSuite;
use coordination::drift::SharedDriftMonitor;
use coordination::escalation::{EscalationLog, EscalationPhase};
use coordination::events::{preview, PipelineEvent, SharedEventBus};
use coordination::router::{TaskCategory, Tier};
use coordination::verifier::{ValidationPipeline, ValidationResult};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agents::{GeneratedText, TestGenerator};
use crate::errors::{PipelineError, TransportError};
use crate::inference::InferenceClient;
use crate::prompts;

/// Per-run identity shared by every step of one run.
#[derive(Debug, Clone, Copy)]
pub struct RunScope<'a> {
    pub run_id: &'a str,
    pub category: TaskCategory,
    pub cancel: &'a CancellationToken,
}

impl RunScope<'_> {
    /// Fail with `Cancelled` if the run was cancelled before `stage`.
    pub fn checkpoint(&self, stage: &str) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::cancelled(stage));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct EscalationController {
    client: InferenceClient,
    tests: TestGenerator,
    validation: ValidationPipeline,
    drift: SharedDriftMonitor,
    events: SharedEventBus,
}

impl EscalationController {
    pub fn new(
        client: InferenceClient,
        validation: ValidationPipeline,
        drift: SharedDriftMonitor,
        events: SharedEventBus,
    ) -> Self {
        Self {
            tests: TestGenerator::new(client.clone()),
            client,
            validation,
            drift,
            events,
        }
    }

    /// Point generated suites at the file name the validator writes
    /// candidates to.
    pub fn with_candidate_file(mut self, candidate_file: impl Into<String>) -> Self {
        self.tests = self.tests.with_candidate_file(candidate_file);
        self
    }

    fn publish(&self, event: PipelineEvent) {
        self.events.publish(event);
    }

    /// Pair a suite with `candidate` and validate the pair.
    ///
    /// `suite` is reused when it already belongs to `candidate`; otherwise a
    /// new one is generated. A transport failure while generating tests is a
    /// failing verdict, not an error. Every verdict is observed by the drift
    /// monitor and published.
    pub async fn test_and_validate(
        &self,
        scope: &RunScope<'_>,
        attempt: u32,
        candidate: &str,
        strategy: &str,
        suite: &mut Option<TestSuite>,
    ) -> Result<ValidationResult, PipelineError> {
        let result = match suite.as_ref().filter(|s| s.matches(candidate)) {
            Some(existing) => {
                self.publish(PipelineEvent::TestsGenerated {
                    run_id: scope.run_id.to_string(),
                    attempt,
                    suite_bytes: existing.text.len(),
                    reused: true,
                    timestamp: Utc::now(),
                });
                self.validate(scope, &existing.text, candidate).await
            }
            None => {
                scope.checkpoint("test generation")?;
                match self.tests.generate_tests(candidate, strategy).await {
                    Ok(fresh) => {
                        self.publish(PipelineEvent::TestsGenerated {
                            run_id: scope.run_id.to_string(),
                            attempt,
                            suite_bytes: fresh.text.len(),
                            reused: false,
                            timestamp: Utc::now(),
                        });
                        let result = self.validate(scope, &fresh.text, candidate).await;
                        *suite = Some(fresh);
                        result
                    }
                    Err(e) => {
                        warn!(run_id = %scope.run_id, attempt, error = %e, "Test generation failed");
                        return Ok(self.transport_failure(scope, attempt, &e));
                    }
                }
            }
        };
        self.record(scope, attempt, &result);
        Ok(result)
    }

    /// Failing verdict for a candidate that could not be produced or tested.
    pub fn transport_failure(
        &self,
        scope: &RunScope<'_>,
        attempt: u32,
        error: &TransportError,
    ) -> ValidationResult {
        let result = ValidationResult::transport_failure(error);
        self.record(scope, attempt, &result);
        result
    }

    fn record(&self, scope: &RunScope<'_>, attempt: u32, result: &ValidationResult) {
        self.drift.observe(scope.category, result);
        self.publish_verdict(scope, attempt, result);
    }

    fn publish_verdict(&self, scope: &RunScope<'_>, attempt: u32, result: &ValidationResult) {
        self.publish(if result.passed {
            PipelineEvent::ValidationPassed {
                run_id: scope.run_id.to_string(),
                attempt,
                duration_ms: result.duration_ms,
                timestamp: Utc::now(),
            }
        } else {
            PipelineEvent::ValidationFailed {
                run_id: scope.run_id.to_string(),
                attempt,
                error_preview: preview(&result.error_text),
                duration_ms: result.duration_ms,
                timestamp: Utc::now(),
            }
        });
    }

    async fn validate(&self, scope: &RunScope<'_>, suite: &str, candidate: &str) -> ValidationResult {
        self.validation
            .validate(scope.category, candidate, suite)
            .await
            .result
    }

    /// The verdict already on record for `candidate` paired with `suite`, if
    /// the run currently stands on exactly that pair.
    fn settled_verdict(
        log: &EscalationLog,
        candidate: &str,
        suite: &Option<TestSuite>,
    ) -> Option<ValidationResult> {
        let paired = suite.as_ref().is_some_and(|s| s.matches(candidate));
        if log.current_candidate() != candidate || !paired {
            return None;
        }
        log.current_validation()
            .filter(|v| !v.is_transport_failure())
            .cloned()
    }

    /// Run attempts until the log reaches a terminal phase.
    ///
    /// Expects `log.begin` to have been called. Returns immediately when the
    /// initial candidate already passed.
    pub async fn run(
        &self,
        scope: &RunScope<'_>,
        log: &mut EscalationLog,
        suite: &mut Option<TestSuite>,
    ) -> Result<EscalationPhase, PipelineError> {
        while let Some(ctx) = log.next_context() {
            let EscalationPhase::Attempting { attempt } = log.phase() else {
                break;
            };
            scope.checkpoint(&format!("escalation attempt {attempt}"))?;
            info!(run_id = %scope.run_id, attempt, max = log.max_attempts(), "Escalating");
            self.publish(PipelineEvent::EscalationAttempt {
                run_id: scope.run_id.to_string(),
                attempt,
                max_attempts: log.max_attempts(),
                tier: Tier::Escalation,
                timestamp: Utc::now(),
            });

            let started_at = Utc::now();
            let response = self
                .client
                .invoke_with_system(
                    Tier::Escalation,
                    Some(prompts::ESCALATION_PREAMBLE),
                    &prompts::escalation_prompt(&ctx),
                )
                .await;

            let (candidate, validation) = match response {
                Ok(raw) => {
                    let generated = GeneratedText::from_raw(&raw);
                    self.publish(PipelineEvent::GenerationCompleted {
                        run_id: scope.run_id.to_string(),
                        attempt,
                        candidate_bytes: generated.text.len(),
                        sanitized: generated.sanitized,
                        timestamp: Utc::now(),
                    });
                    let validation = match Self::settled_verdict(log, &generated.text, suite) {
                        Some(verdict) => {
                            // Same candidate, same suite: the pair already has its verdict.
                            info!(
                                run_id = %scope.run_id,
                                attempt,
                                "Escalation returned the unchanged candidate"
                            );
                            self.publish_verdict(scope, attempt, &verdict);
                            verdict
                        }
                        None => {
                            self.test_and_validate(
                                scope,
                                attempt,
                                &generated.text,
                                &ctx.strategy,
                                suite,
                            )
                            .await?
                        }
                    };
                    (generated.text, validation)
                }
                Err(e) => {
                    // The run keeps standing on the prior candidate.
                    warn!(run_id = %scope.run_id, attempt, error = %e, "Escalation call failed");
                    let validation = self.transport_failure(scope, attempt, &e);
                    (ctx.prior_candidate.clone(), validation)
                }
            };

            let phase =
                log.record_attempt(Tier::Escalation, ctx, candidate, validation, started_at)?;
            info!(run_id = %scope.run_id, summary = %log.summary(), "Attempt recorded");
            if phase.is_terminal() {
                return Ok(phase);
            }
        }
        Ok(log.phase())
    }
}
