//! Tiered code-generation pipeline.
//!
//! Turns a natural-language objective into validated code by driving three
//! model tiers (planning, generation, escalation) over OpenAI-compatible
//! endpoints. Deterministic pieces (pool, classifier, sanitizer, validator,
//! escalation bookkeeping, drift) come from the `coordination` crate.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use task_pipeline::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::from_config(PipelineConfig::load(None)?)?;
//! let outcome = pipeline.run_pipeline("add two integers").await?;
//! println!("{:?}: {}", outcome.status, outcome.candidate);
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod config;
pub mod errors;
pub mod escalation;
pub mod inference;
pub mod orchestrator;
pub mod prompts;

pub use config::{ConfigError, PipelineConfig};
pub use errors::{PipelineError, PlanningError, RetryCategory, TransportError};
pub use inference::{ChatRequest, ChatTransport, HttpTransport, InferenceClient};
pub use orchestrator::{Pipeline, PipelineOutcome, RunStatus};
