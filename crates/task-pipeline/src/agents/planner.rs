//! Planner: objective → strategy on the planning tier.

use coordination::router::Tier;
use tracing::info;

use crate::errors::PlanningError;
use crate::inference::InferenceClient;
use crate::prompts;

#[derive(Clone)]
pub struct Planner {
    client: InferenceClient,
}

impl Planner {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }

    /// Produce a strategy for `objective`.
    ///
    /// The raw response is returned trimmed. A blank response is an error,
    /// so a successful strategy is never empty.
    pub async fn plan(&self, objective: &str) -> Result<String, PlanningError> {
        let strategy = self
            .client
            .invoke_with_system(
                Tier::Planning,
                Some(prompts::PLANNER_PREAMBLE),
                &prompts::planning_prompt(objective),
            )
            .await?;

        let strategy = strategy.trim();
        if strategy.is_empty() {
            return Err(PlanningError::EmptyStrategy);
        }
        info!(chars = strategy.len(), "Strategy ready");
        Ok(strategy.to_string())
    }
}
