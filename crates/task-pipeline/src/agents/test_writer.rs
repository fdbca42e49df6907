//! Test generator: candidate → paired test suite on the generation tier.

use coordination::artifact::TestSuite;
use coordination::router::Tier;
use coordination::verifier::SandboxConfig;
use tracing::debug;

use super::coder::GeneratedText;
use crate::errors::TransportError;
use crate::inference::InferenceClient;
use crate::prompts;

#[derive(Clone)]
pub struct TestGenerator {
    client: InferenceClient,
    candidate_file: String,
}

impl TestGenerator {
    pub fn new(client: InferenceClient) -> Self {
        Self {
            client,
            candidate_file: SandboxConfig::default().candidate_file,
        }
    }

    /// File name the validator writes candidates to; the prompt points the
    /// suite at it.
    pub fn with_candidate_file(mut self, candidate_file: impl Into<String>) -> Self {
        self.candidate_file = candidate_file.into();
        self
    }

    /// Generate a suite for exactly `candidate`. The result is paired with it.
    pub async fn generate_tests(
        &self,
        candidate: &str,
        strategy: &str,
    ) -> Result<TestSuite, TransportError> {
        let raw = self
            .client
            .invoke_with_system(
                Tier::Generation,
                Some(prompts::CODER_PREAMBLE),
                &prompts::test_prompt(candidate, strategy, &self.candidate_file),
            )
            .await?;
        let suite = GeneratedText::from_raw(&raw);
        debug!(bytes = suite.text.len(), sanitized = suite.sanitized, "Test suite generated");
        Ok(TestSuite::for_candidate(suite.text, candidate))
    }
}
