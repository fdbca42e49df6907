//! Inference Client: one prompt in, raw text out, with a single failover.
//!
//! `invoke` selects an endpoint from the shared pool, bounds the call with
//! the configured timeout, and on failure records it and tries the next
//! endpoint exactly once. At most two underlying calls per `invoke`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use coordination::events::{PipelineEvent, SharedEventBus};
use coordination::router::{SharedEndpointPool, Tier};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::{PipelineConfig, TierConfig};
use crate::errors::TransportError;

/// Underlying calls per `invoke`: the first plus one retry.
pub const MAX_CALLS_PER_INVOKE: usize = 2;

/// A single chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Sends one request to one address. No retries, no timeout of its own.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(&self, address: &str, request: &ChatRequest) -> Result<String, TransportError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
        }
    }

    fn url(address: &str) -> String {
        format!("{}/chat/completions", address.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn complete(&self, address: &str, request: &ChatRequest) -> Result<String, TransportError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        let body = CompletionBody {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let mut req = self.http.post(Self::url(address)).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| TransportError::Request {
            address: address.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                address: address.to_string(),
                status,
                body: coordination::events::preview(&body),
            });
        }

        let parsed: CompletionResponse =
            response
                .json()
                .await
                .map_err(|e| TransportError::InvalidResponse {
                    address: address.to_string(),
                    message: e.to_string(),
                })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::InvalidResponse {
                address: address.to_string(),
                message: "no choices in response".to_string(),
            })?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

/// Generation parameters for one tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&TierConfig> for TierSettings {
    fn from(tc: &TierConfig) -> Self {
        Self {
            model: tc.model.clone(),
            max_tokens: tc.max_tokens,
            temperature: tc.temperature,
        }
    }
}

/// Pool-aware client shared by every agent and every concurrent run.
#[derive(Clone)]
pub struct InferenceClient {
    pool: SharedEndpointPool,
    transport: Arc<dyn ChatTransport>,
    tiers: HashMap<Tier, TierSettings>,
    timeout: Duration,
    events: Option<SharedEventBus>,
}

impl InferenceClient {
    pub fn new(
        pool: SharedEndpointPool,
        transport: Arc<dyn ChatTransport>,
        tiers: HashMap<Tier, TierSettings>,
        timeout: Duration,
    ) -> Self {
        Self {
            pool,
            transport,
            tiers,
            timeout,
            events: None,
        }
    }

    pub fn from_config(
        config: &PipelineConfig,
        pool: SharedEndpointPool,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let tiers = Tier::all()
            .iter()
            .map(|&t| (t, TierSettings::from(config.tiers.get(t))))
            .collect();
        Self::new(
            pool,
            transport,
            tiers,
            Duration::from_secs(config.inference_timeout_secs),
        )
    }

    /// Publish `endpoint_tripped` events on this bus.
    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn pool(&self) -> &SharedEndpointPool {
        &self.pool
    }

    /// Model identifier configured for `tier`.
    pub fn model(&self, tier: Tier) -> &str {
        self.tiers.get(&tier).map(|s| s.model.as_str()).unwrap_or_default()
    }

    /// Send `prompt` to `tier` as a single user message.
    pub async fn invoke(&self, tier: Tier, prompt: &str) -> Result<String, TransportError> {
        self.invoke_with_system(tier, None, prompt).await
    }

    /// Send `prompt` with an optional system message.
    pub async fn invoke_with_system(
        &self,
        tier: Tier,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<String, TransportError> {
        let settings = self.tiers.get(&tier);
        let request = ChatRequest {
            model: settings.map(|s| s.model.clone()).unwrap_or_default(),
            system: system.map(String::from),
            prompt: prompt.to_string(),
            max_tokens: settings.map(|s| s.max_tokens).unwrap_or(2048),
            temperature: settings.map(|s| s.temperature).unwrap_or(0.2),
        };

        let mut call = 1;
        loop {
            match self.call_once(tier, &request).await {
                Ok(text) => return Ok(text),
                // Nothing to fail over to.
                Err(e @ TransportError::NoEndpoints(_)) => return Err(e),
                Err(e) if call >= MAX_CALLS_PER_INVOKE => {
                    warn!(%tier, error = %e, "Inference failed after retry");
                    return Err(e);
                }
                Err(e) => {
                    warn!(%tier, error = %e, "Inference failed, retrying on next endpoint");
                    call += 1;
                }
            }
        }
    }

    async fn call_once(&self, tier: Tier, request: &ChatRequest) -> Result<String, TransportError> {
        let address = self.pool.select(tier)?;
        let start = Instant::now();
        debug!(%tier, %address, model = %request.model, "Inference call");

        let result = match tokio::time::timeout(self.timeout, self.transport.complete(&address, request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                address: address.clone(),
                secs: self.timeout.as_secs(),
            }),
        };

        match result {
            Ok(text) => {
                self.pool.record_outcome(&address, true);
                info!(
                    %tier,
                    %address,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    chars = text.len(),
                    "Inference succeeded"
                );
                Ok(text)
            }
            Err(e) => {
                let tripped = self.pool.record_outcome(&address, false);
                if let Some(bus) = &self.events {
                    for record in tripped {
                        bus.publish(PipelineEvent::EndpointTripped {
                            tier: record.tier,
                            address: record.address,
                            consecutive_failures: record.consecutive_failures,
                            timestamp: Utc::now(),
                        });
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::router::{EndpointPool, PoolError};
    use mockall::predicate::eq;

    fn pool(addresses: &[&str]) -> SharedEndpointPool {
        let mut tiers = HashMap::new();
        tiers.insert(
            Tier::Generation,
            addresses.iter().map(|a| a.to_string()).collect(),
        );
        EndpointPool::new(tiers, 2).shared()
    }

    fn settings() -> HashMap<Tier, TierSettings> {
        let mut tiers = HashMap::new();
        tiers.insert(
            Tier::Generation,
            TierSettings {
                model: "coder".into(),
                max_tokens: 512,
                temperature: 0.1,
            },
        );
        tiers
    }

    fn client(pool: SharedEndpointPool, transport: MockChatTransport) -> InferenceClient {
        InferenceClient::new(pool, Arc::new(transport), settings(), Duration::from_secs(5))
    }

    fn refused(address: &str) -> TransportError {
        TransportError::Request {
            address: address.to_string(),
            message: "connection refused".to_string(),
        }
    }

    #[tokio::test]
    async fn test_success_records_outcome() {
        let mut transport = MockChatTransport::new();
        transport
            .expect_complete()
            .with(eq("http://a"), mockall::predicate::always())
            .times(1)
            .returning(|_, req| {
                assert_eq!(req.model, "coder");
                assert_eq!(req.max_tokens, 512);
                Ok("def add(a, b): return a + b".to_string())
            });

        let pool = pool(&["http://a", "http://b"]);
        let client = client(pool.clone(), transport);
        let text = client.invoke(Tier::Generation, "add").await.unwrap();
        assert!(text.contains("def add"));
        assert_eq!(pool.snapshot(Tier::Generation)[0].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_retries_once_on_next_endpoint() {
        let mut transport = MockChatTransport::new();
        transport
            .expect_complete()
            .with(eq("http://a"), mockall::predicate::always())
            .times(1)
            .returning(|addr, _| Err(refused(addr)));
        transport
            .expect_complete()
            .with(eq("http://b"), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok("ok".to_string()));

        let pool = pool(&["http://a", "http://b", "http://c"]);
        let client = client(pool.clone(), transport);
        assert_eq!(client.invoke(Tier::Generation, "p").await.unwrap(), "ok");
        let records = pool.snapshot(Tier::Generation);
        assert_eq!(records[0].consecutive_failures, 1);
        assert_eq!(records[1].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_two_calls() {
        let mut transport = MockChatTransport::new();
        transport
            .expect_complete()
            .times(2)
            .returning(|addr, _| Err(refused(addr)));

        let client = client(pool(&["http://a", "http://b", "http://c"]), transport);
        let err = client.invoke(Tier::Generation, "p").await.unwrap_err();
        assert_eq!(err, refused("http://b"));
    }

    #[tokio::test]
    async fn test_missing_tier_makes_no_calls() {
        let mut transport = MockChatTransport::new();
        transport.expect_complete().times(0);

        let client = client(pool(&["http://a"]), transport);
        let err = client.invoke(Tier::Planning, "p").await.unwrap_err();
        assert_eq!(err, TransportError::NoEndpoints(PoolError::NoEndpoints(Tier::Planning)));
    }

    struct SlowTransport;

    #[async_trait]
    impl ChatTransport for SlowTransport {
        async fn complete(&self, _address: &str, _request: &ChatRequest) -> Result<String, TransportError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let pool = pool(&["http://a", "http://b"]);
        let client = InferenceClient::new(
            pool.clone(),
            Arc::new(SlowTransport),
            settings(),
            Duration::from_secs(2),
        );
        let err = client.invoke(Tier::Generation, "p").await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Timeout {
                address: "http://b".into(),
                secs: 2
            }
        );
        for record in pool.snapshot(Tier::Generation) {
            assert_eq!(record.consecutive_failures, 1);
        }
    }

    #[tokio::test]
    async fn test_trip_publishes_event() {
        let mut transport = MockChatTransport::new();
        transport
            .expect_complete()
            .returning(|addr, _| Err(refused(addr)));

        let bus = coordination::events::EventBus::new().shared();
        let mut rx = bus.subscribe();
        let pool = pool(&["http://only"]);
        let client = client(pool, transport).with_events(bus.clone());

        // threshold 2: the third consecutive failure trips
        let _ = client.invoke(Tier::Generation, "p").await;
        let _ = client.invoke(Tier::Generation, "p").await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "endpoint_tripped");
    }
}
