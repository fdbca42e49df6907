//! Orchestration: one objective through classify → plan → generate → test →
//! validate → escalate, then hand the outcome to the registry.
//!
//! A [`Pipeline`] is cheap to clone and safe to share; many runs may execute
//! concurrently against its single endpoint pool and drift monitor. Each run
//! owns its candidate, suite, and attempt log.

use std::sync::Arc;

use chrono::Utc;
use coordination::artifact::{fingerprint, TestSuite};
use coordination::drift::{DriftMonitor, SharedDriftMonitor};
use coordination::escalation::{EscalationAttempt, EscalationEngine, EscalationLog, EscalationPhase};
use coordination::events::{preview, EventBus, PipelineEvent, RunId, SharedEventBus};
use coordination::registry::{RegistryRecord, SharedRegistry};
use coordination::router::{classify_detailed, Classification, EndpointPool, SharedEndpointPool};
use coordination::verifier::{
    AnalysisGate, CommandAnalysisGate, SandboxValidator, ValidationPipeline, ValidationResult,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agents::{CodeGenerator, Planner};
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::escalation::{EscalationController, RunScope};
use crate::inference::{ChatTransport, HttpTransport, InferenceClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Exhausted,
}

/// Result of a run that reached a terminal escalation phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    pub classification: Classification,
    pub strategy: String,
    /// Accepted candidate on success, last candidate on exhaustion
    pub candidate: String,
    /// Suite paired with `candidate`; empty if none could be generated
    pub test_suite: String,
    pub attempts: Vec<EscalationAttempt>,
    pub final_validation: ValidationResult,
    /// Registry key of the objective
    pub fingerprint: String,
    /// Drift signal for the run's category after this run's verdicts
    pub drift_degraded: bool,
}

impl PipelineOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    pool: SharedEndpointPool,
    planner: Planner,
    coder: CodeGenerator,
    escalation: EscalationController,
    engine: EscalationEngine,
    drift: SharedDriftMonitor,
    events: SharedEventBus,
    registry: Option<SharedRegistry>,
}

impl Pipeline {
    /// Build the production pipeline: HTTP transport, sandbox validator, and
    /// the configured analysis gates.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let sandbox = config
            .sandbox_config()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let mut validation = ValidationPipeline::new(Arc::new(SandboxValidator::new(sandbox)));
        for gate in config
            .analysis_gate_configs()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?
        {
            let gate: Arc<dyn AnalysisGate> = Arc::new(CommandAnalysisGate::new(gate));
            validation = validation.with_gate(gate);
        }
        let transport = Arc::new(HttpTransport::new(config.api_key.clone()));
        Self::new(config, transport, validation)
    }

    /// Build with caller-supplied transport and validation.
    pub fn new(
        config: PipelineConfig,
        transport: Arc<dyn ChatTransport>,
        validation: ValidationPipeline,
    ) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let engine = EscalationEngine::new(config.max_attempts)?;

        let events = EventBus::new().shared();
        let pool = EndpointPool::new(config.endpoint_map(), config.endpoint_failure_threshold).shared();
        let drift = DriftMonitor::new(config.drift).shared();
        let client =
            InferenceClient::from_config(&config, pool.clone(), transport).with_events(events.clone());

        info!(
            planning = config.tiers.planning.endpoints.len(),
            generation = config.tiers.generation.endpoints.len(),
            escalation = config.tiers.escalation.endpoints.len(),
            max_attempts = config.max_attempts,
            gates = ?validation.gate_names(),
            prompt_version = crate::prompts::PROMPT_VERSION,
            "Pipeline ready"
        );

        Ok(Self {
            planner: Planner::new(client.clone()),
            coder: CodeGenerator::new(client.clone()),
            escalation: EscalationController::new(client, validation, drift.clone(), events.clone())
                .with_candidate_file(config.validator.candidate_file.clone()),
            config: Arc::new(config),
            pool,
            engine,
            drift,
            events,
            registry: None,
        })
    }

    /// Hand finished runs to `registry`.
    pub fn with_registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn pool(&self) -> &SharedEndpointPool {
        &self.pool
    }

    pub fn drift(&self) -> &SharedDriftMonitor {
        &self.drift
    }

    fn publish(&self, event: PipelineEvent) {
        self.events.publish(event);
    }

    pub async fn run_pipeline(&self, objective: &str) -> Result<PipelineOutcome, PipelineError> {
        self.run_pipeline_with_cancel(objective, CancellationToken::new())
            .await
    }

    /// Run `objective` to `Succeeded` or `Exhausted`.
    ///
    /// Errors only on planning failure, cancellation, or a broken escalation
    /// budget; each is preceded by a `run_aborted` event.
    pub async fn run_pipeline_with_cancel(
        &self,
        objective: &str,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let run_id = PipelineEvent::new_run_id();
        let classification = classify_detailed(objective);
        let fingerprint = fingerprint(objective);
        info!(
            %run_id,
            category = %classification.category,
            keyword = ?classification.matched_keyword,
            "Run started"
        );
        self.publish(PipelineEvent::RunStarted {
            run_id: run_id.clone(),
            objective_preview: preview(objective),
            category: classification.category,
            fingerprint: fingerprint.clone(),
            timestamp: Utc::now(),
        });

        let scope = RunScope {
            run_id: &run_id,
            category: classification.category,
            cancel: &cancel,
        };
        match self.drive(&scope, objective, classification, fingerprint).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(%run_id, error = %e, "Run aborted");
                self.publish(PipelineEvent::RunAborted {
                    run_id: run_id.clone(),
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        scope: &RunScope<'_>,
        objective: &str,
        classification: Classification,
        fingerprint: String,
    ) -> Result<PipelineOutcome, PipelineError> {
        let run_id = scope.run_id.to_string();

        scope.checkpoint("planning")?;
        self.publish(PipelineEvent::PlanningStarted {
            run_id: run_id.clone(),
            timestamp: Utc::now(),
        });
        let strategy = self.planner.plan(objective).await?;
        self.publish(PipelineEvent::PlanningCompleted {
            run_id: run_id.clone(),
            strategy_preview: preview(&strategy),
            timestamp: Utc::now(),
        });

        scope.checkpoint("generation")?;
        let mut suite: Option<TestSuite> = None;
        let (candidate, initial) = match self
            .coder
            .generate(scope.category, objective, &strategy)
            .await
        {
            Ok(generated) => {
                self.publish(PipelineEvent::GenerationCompleted {
                    run_id: run_id.clone(),
                    attempt: 0,
                    candidate_bytes: generated.text.len(),
                    sanitized: generated.sanitized,
                    timestamp: Utc::now(),
                });
                let verdict = self
                    .escalation
                    .test_and_validate(scope, 0, &generated.text, &strategy, &mut suite)
                    .await?;
                (generated.text, verdict)
            }
            Err(e) => {
                warn!(%run_id, error = %e, "Generation failed");
                (String::new(), self.escalation.transport_failure(scope, 0, &e))
            }
        };

        let mut log = EscalationLog::new(
            objective,
            strategy.as_str(),
            self.config.capabilities.clone(),
            self.engine,
        );
        log.begin(candidate, initial)?;
        let phase = self.escalation.run(scope, &mut log, &mut suite).await?;

        let status = match phase {
            EscalationPhase::Succeeded => RunStatus::Succeeded,
            _ => RunStatus::Exhausted,
        };
        let candidate = log.current_candidate().to_string();
        let final_validation = log
            .current_validation()
            .cloned()
            .unwrap_or_else(|| ValidationResult::failed("no validation recorded", 0));
        let suite = suite.filter(|s| s.matches(&candidate));
        let attempts = log.into_attempts();

        self.hand_off(
            &fingerprint,
            objective,
            &classification,
            status,
            &candidate,
            suite.as_ref(),
            &final_validation,
            &attempts,
        )
        .await;

        let drift = self.drift.snapshot(scope.category);
        if drift.degraded {
            warn!(
                %run_id,
                category = %scope.category,
                failure_rate = drift.failure_rate,
                samples = drift.samples,
                "Drift detected"
            );
            self.publish(PipelineEvent::DriftDetected {
                run_id: run_id.clone(),
                category: scope.category,
                failure_rate: drift.failure_rate,
                samples: drift.samples,
                timestamp: Utc::now(),
            });
        }

        match status {
            RunStatus::Succeeded => {
                info!(%run_id, attempts = attempts.len(), "Run succeeded");
                self.publish(PipelineEvent::RunSucceeded {
                    run_id: run_id.clone(),
                    attempts: attempts.len(),
                    timestamp: Utc::now(),
                });
            }
            RunStatus::Exhausted => {
                warn!(%run_id, attempts = attempts.len(), "Run exhausted escalation budget");
                self.publish(PipelineEvent::RunExhausted {
                    run_id: run_id.clone(),
                    attempts: attempts.len(),
                    last_error_preview: preview(&final_validation.error_text),
                    timestamp: Utc::now(),
                });
            }
        }

        Ok(PipelineOutcome {
            run_id,
            status,
            classification,
            strategy,
            candidate,
            test_suite: suite.map(|s| s.text).unwrap_or_default(),
            attempts,
            final_validation,
            fingerprint,
            drift_degraded: drift.degraded,
        })
    }

    /// Give the finished run to the registry. Failures only warn.
    #[allow(clippy::too_many_arguments)]
    async fn hand_off(
        &self,
        fingerprint: &str,
        objective: &str,
        classification: &Classification,
        status: RunStatus,
        candidate: &str,
        suite: Option<&TestSuite>,
        final_validation: &ValidationResult,
        attempts: &[EscalationAttempt],
    ) {
        let Some(registry) = &self.registry else {
            return;
        };
        let record = match (status, suite) {
            (RunStatus::Succeeded, Some(suite)) => RegistryRecord::Accepted {
                fingerprint: fingerprint.to_string(),
                objective: objective.to_string(),
                category: classification.category,
                candidate: candidate.to_string(),
                test_suite: suite.clone(),
                attempts_used: attempts.len(),
                recorded_at: Utc::now(),
            },
            (RunStatus::Succeeded, None) => {
                warn!(%fingerprint, "Accepted candidate has no paired suite; not recorded");
                return;
            }
            (RunStatus::Exhausted, _) => RegistryRecord::Exhausted {
                fingerprint: fingerprint.to_string(),
                objective: objective.to_string(),
                category: classification.category,
                last_candidate: candidate.to_string(),
                last_error: final_validation.error_text.clone(),
                attempts: attempts.to_vec(),
                recorded_at: Utc::now(),
            },
        };
        if let Err(e) = registry.put(record).await {
            warn!(%fingerprint, error = %e, "Registry hand-off failed");
        }
    }
}
