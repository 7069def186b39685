//! OpenAI-compatible embedding client
//!
//! Requests go to `{base_url}/embeddings`. Every logical call runs through a
//! `ResilientCaller`: transient failures are retried with backoff inside a
//! single execution of the breaker named `openai-embedding-<model>`.

use crate::classifier::HttpStatusClassifier;
use crate::error::{EmbeddingError, RequestError};
use kb_resilience::{CircuitBreaker, CircuitBreakerRegistry, Config, ResilientCaller, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TRUNCATE_PROMPT_TOKENS: usize = 511;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// `embed` repeats the batch call this many times when the service answers with no data
const EMPTY_RESPONSE_ATTEMPTS: usize = 3;

/// Embedder settings
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub api_key: String,
    /// Defaults to the public OpenAI endpoint when empty
    pub base_url: String,
    pub model_name: String,
    /// Server-side input truncation (0 = default of 511)
    pub truncate_prompt_tokens: usize,
    pub dimensions: usize,
    pub model_id: String,
    /// Per-attempt HTTP timeout
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: Config,
}

impl EmbedderConfig {
    pub fn new(api_key: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_name: model_name.into(),
            truncate_prompt_tokens: DEFAULT_TRUNCATE_PROMPT_TOKENS,
            dimensions: 0,
            model_id: String::new(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            breaker: Config::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_truncate_prompt_tokens(mut self, tokens: usize) -> Self {
        self.truncate_prompt_tokens = tokens;
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker_config(mut self, breaker: Config) -> Self {
        self.breaker = breaker;
        self
    }
}

/// Text embedder backed by an OpenAI-compatible `/embeddings` endpoint
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model_name: String,
    truncate_prompt_tokens: usize,
    dimensions: usize,
    model_id: String,
    caller: ResilientCaller,
}

impl OpenAiEmbedder {
    /// Build an embedder whose breaker is shared through `registry`
    pub fn new(config: EmbedderConfig, registry: &CircuitBreakerRegistry) -> Result<Self, EmbeddingError> {
        let model_name = config.model_name.trim().to_string();
        if model_name.is_empty() {
            return Err(EmbeddingError::Config("model name is required".into()));
        }

        let base_url = match config.base_url.trim() {
            "" => DEFAULT_BASE_URL,
            url => url,
        };
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));

        let truncate_prompt_tokens = match config.truncate_prompt_tokens {
            0 => DEFAULT_TRUNCATE_PROMPT_TOKENS,
            n => n,
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(EmbeddingError::Client)?;

        let breaker = registry.get_with_config(&format!("openai-embedding-{}", model_name), config.breaker);
        let caller =
            ResilientCaller::new(breaker, config.retry).with_classifier(Arc::new(HttpStatusClassifier));

        debug!(model = %model_name, endpoint = %endpoint, "embedding client created");

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key,
            model_name,
            truncate_prompt_tokens,
            dimensions: config.dimensions,
            model_id: config.model_id,
            caller,
        })
    }

    /// Embed one text
    ///
    /// Repeats the request a few times if the service answers with an empty
    /// `data` array before giving up with `NoEmbedding`.
    pub async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>, EmbeddingError> {
        let texts = [text.to_string()];
        for attempt in 1..=EMPTY_RESPONSE_ATTEMPTS {
            let embeddings = self.batch_embed(&texts, cancel).await?;
            if let Some(embedding) = embeddings.into_iter().next() {
                return Ok(embedding);
            }
            warn!(model = %self.model_name, attempt, "embedding service returned no data");
        }
        Err(EmbeddingError::NoEmbedding)
    }

    /// Embed several texts in one request; vectors come back in response order
    pub async fn batch_embed(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbedRequest {
            model: &self.model_name,
            input: texts,
            truncate_prompt_tokens: self.truncate_prompt_tokens,
        };
        let body = &body;

        let embeddings = self
            .caller
            .call(cancel, move |attempt| self.send(body, attempt))
            .await?;
        Ok(embeddings)
    }

    /// One HTTP attempt; the request is rebuilt every time
    async fn send(&self, body: &EmbedRequest<'_>, attempt: u32) -> Result<Vec<Vec<f32>>, RequestError> {
        debug!(model = %self.model_name, attempt, inputs = body.input.len(), "sending embedding request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            warn!(model = %self.model_name, attempt, status = status.as_u16(), "embedding request returned error status");
            return Err(RequestError::status(status.as_u16(), &bytes));
        }

        let parsed: EmbedResponse = serde_json::from_slice(&bytes)?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.caller.breaker()
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("endpoint", &self.endpoint)
            .field("model_name", &self.model_name)
            .field("dimensions", &self.dimensions)
            .field("caller", &self.caller)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    truncate_prompt_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}
