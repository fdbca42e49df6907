//! Code generator: strategy → sanitized candidate on the generation tier.

use coordination::router::{TaskCategory, Tier};
use coordination::sanitizer::sanitize;
use tracing::debug;

use crate::errors::TransportError;
use crate::inference::InferenceClient;
use crate::prompts;

/// Sanitized model output plus whether sanitizing changed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText {
    pub text: String,
    pub sanitized: bool,
}

impl GeneratedText {
    pub fn from_raw(raw: &str) -> Self {
        let text = sanitize(raw);
        let sanitized = text != raw;
        Self { text, sanitized }
    }
}

#[derive(Clone)]
pub struct CodeGenerator {
    client: InferenceClient,
}

impl CodeGenerator {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }

    pub async fn generate(
        &self,
        category: TaskCategory,
        objective: &str,
        strategy: &str,
    ) -> Result<GeneratedText, TransportError> {
        let raw = self
            .client
            .invoke_with_system(
                Tier::Generation,
                Some(prompts::CODER_PREAMBLE),
                &prompts::generation_prompt(category, objective, strategy),
            )
            .await?;
        let out = GeneratedText::from_raw(&raw);
        debug!(%category, sanitized = out.sanitized, bytes = out.text.len(), "Candidate generated");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{MockChatTransport, TierSettings};
    use coordination::router::EndpointPool;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn generator(transport: MockChatTransport) -> CodeGenerator {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            Tier::Generation,
            vec!["http://g1".into(), "http://g2".into(), "http://g3".into()],
        );
        let mut tiers = HashMap::new();
        tiers.insert(
            Tier::Generation,
            TierSettings {
                model: "coder".into(),
                max_tokens: 1024,
                temperature: 0.2,
            },
        );
        CodeGenerator::new(InferenceClient::new(
            EndpointPool::new(endpoints, 2).shared(),
            Arc::new(transport),
            tiers,
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_strips_fences() {
        let mut transport = MockChatTransport::new();
        transport.expect_complete().returning(|_, req| {
            assert_eq!(req.model, "coder");
            Ok("Sure:\n```python\ndef add(a, b):\n    return a + b\n```\nDone.".into())
        });
        let out = generator(transport)
            .generate(TaskCategory::Generate, "add two integers", "use +")
            .await
            .unwrap();
        assert_eq!(out.text, "def add(a, b):\n    return a + b");
        assert!(out.sanitized);
    }

    #[tokio::test]
    async fn test_all_endpoints_down_two_calls() {
        let mut transport = MockChatTransport::new();
        transport.expect_complete().times(2).returning(|addr, _| {
            Err(TransportError::Request {
                address: addr.into(),
                message: "unreachable".into(),
            })
        });
        let err = generator(transport)
            .generate(TaskCategory::Generate, "o", "s")
            .await
            .unwrap_err();
        assert_eq!(err.address(), Some("http://g2"));
    }

    #[test]
    fn test_clean_text_not_marked_sanitized() {
        let out = GeneratedText::from_raw("def f():\n    return 1");
        assert!(!out.sanitized);
    }
}
