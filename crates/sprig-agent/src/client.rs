//! Reasoning collaborator
//!
//! Every call is stateless: one system prompt, one user prompt, one answer.

use async_trait::async_trait;
use sprig_core::{ReasoningConfig, Result, SprigError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::types::{Message, MessagesRequest, MessagesResponse};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Black-box text completion
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Retry schedule for rate limits and server errors
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
        }
    }
}

/// Client for an Anthropic-style messages endpoint
pub struct AnthropicClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: ANTHROPIC_API_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            retry: RetryPolicy::default(),
            breaker: CircuitBreaker::default(),
        }
    }

    /// Build from configuration. The API key must already be resolved.
    pub fn from_config(config: &ReasoningConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                SprigError::Config(format!(
                    "Reasoning is enabled but no API key was provided (set {})",
                    config.api_key_env
                ))
            })?;
        Ok(Self::new(api_key, config.model.clone(), config.max_tokens))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl ReasoningClient for AnthropicClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if !self.breaker.can_execute() {
            return Err(SprigError::ReasoningLimit(format!(
                "Circuit breaker is open after repeated failures; retry in {}s",
                self.breaker.time_until_retry().as_secs()
            )));
        }

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system_prompt.to_string(),
            messages: vec![Message::user(user_prompt)],
        };

        let mut retries = 0;
        let mut backoff = self.retry.initial_backoff;

        loop {
            debug!("Sending request (attempt {})", retries + 1);

            let sent = self
                .http
                .post(&self.endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    self.breaker.record_failure();
                    return Err(SprigError::Reasoning(format!("Failed to send request: {}", e)));
                }
            };
            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                retries += 1;
                if retries > self.retry.max_retries {
                    let body = response.text().await.unwrap_or_default();
                    self.breaker.record_failure();
                    return Err(SprigError::ReasoningLimit(format!(
                        "{} after {} retries: {}",
                        status, self.retry.max_retries, body
                    )));
                }

                let wait = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(backoff);

                warn!(
                    "{} from reasoning backend; waiting {}s before retry {}/{}",
                    status,
                    wait.as_secs(),
                    retries,
                    self.retry.max_retries
                );
                tokio::time::sleep(wait).await;
                backoff = (backoff * 2).min(self.retry.max_backoff);
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                self.breaker.record_failure();
                error!(
                    "Reasoning backend error {} (consecutive failures: {})",
                    status,
                    self.breaker.failure_count()
                );
                return Err(SprigError::Reasoning(format!("API error {}: {}", status, body)));
            }

            let parsed: MessagesResponse = response
                .json()
                .await
                .map_err(|e| SprigError::Reasoning(format!("Failed to parse response: {}", e)))?;

            let text = parsed.text();
            if text.trim().is_empty() {
                return Err(SprigError::Reasoning("No text content in response".to_string()));
            }

            self.breaker.record_success();
            match parsed.usage {
                Some(usage) => info!(
                    "Completion received ({} chars, {} input tokens, {} output tokens)",
                    text.len(),
                    usage.input_tokens,
                    usage.output_tokens
                ),
                None => info!("Completion received ({} chars)", text.len()),
            }
            return Ok(text);
        }
    }
}

/// Scripted client for tests and dry runs
///
/// Replies are returned in order; once exhausted every call fails.
/// Prompts are recorded as `(system, user)` pairs.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    replies: Arc<Mutex<VecDeque<Result<String>>>>,
    prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(reply.into()));
        }
        self
    }

    pub fn with_error(self, error: SprigError) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(error));
        }
        self
    }

    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningClient for ScriptedClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((system_prompt.to_string(), user_prompt.to_string()));
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| Err(SprigError::Reasoning("No scripted reply left".to_string())))
    }
}
