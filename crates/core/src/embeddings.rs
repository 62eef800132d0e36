use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Maps text to dense vectors. Implementations must be deterministic for a
/// fixed configuration and must return one vector per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fixed output dimension, when known ahead of the first call.
    fn dimensions(&self) -> Option<usize>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError>;

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl<T> EmbeddingProvider for Box<T>
where
    T: EmbeddingProvider + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn dimensions(&self) -> Option<usize> {
        (**self).dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, PipelineError> {
        (**self).embed_batch(texts).await
    }
}

/// Hashed character-trigram embedder. Runs locally, has no input window and
/// never truncates.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    fn name(&self) -> &str {
        "ngram"
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions.max(1))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimensions: Option<usize>,
    pub max_batch_size: usize,
    pub timeout: Duration,
}

impl Default for HttpEmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            dimensions: None,
            max_batch_size: 96,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Client for OpenAI-compatible `/embeddings` endpoints. Input length is
/// bounded only by the remote model's window; nothing is truncated here.
pub struct HttpEmbeddingProvider {
    client: Client,
    endpoint: Url,
    config: HttpEmbeddingConfig,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    pub fn new(config: HttpEmbeddingConfig) -> Result<Self, PipelineError> {
        if config.model.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "embedding model name is empty".to_string(),
            ));
        }
        if config.max_batch_size == 0 {
            return Err(PipelineError::Configuration(
                "embedding batch size must be positive".to_string(),
            ));
        }

        let endpoint = Url::parse(&format!(
            "{}/embeddings",
            config.base_url.trim_end_matches('/')
        ))
        .map_err(|error| {
            PipelineError::Configuration(format!(
                "invalid embedding url {}: {error}",
                config.base_url
            ))
        })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| PipelineError::Configuration(error.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    async fn request_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, PipelineError> {
        debug!(
            provider = self.name(),
            batch_size = texts.len(),
            "embedding batch"
        );

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .json(&EmbeddingRequest {
                model: &self.config.model,
                input: texts,
                dimensions: self.config.dimensions,
            });

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| PipelineError::embedding(self.name(), error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::embedding(
                self.name(),
                format!("{} returned {status}: {body}", self.endpoint),
            ));
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| PipelineError::embedding(self.name(), error))?;

        ordered_embeddings(payload, texts.len())
            .map_err(|message| PipelineError::embedding(self.name(), message))
    }
}

fn ordered_embeddings(
    mut payload: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, String> {
    if payload.data.len() != expected {
        return Err(format!(
            "returned {} embeddings for {expected} inputs",
            payload.data.len()
        ));
    }

    payload.data.sort_by_key(|datum| datum.index);
    if payload
        .data
        .iter()
        .enumerate()
        .any(|(position, datum)| datum.index != position)
    {
        return Err("response indices do not cover the request".to_string());
    }

    Ok(payload
        .data
        .into_iter()
        .map(|datum| datum.embedding)
        .collect())
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn dimensions(&self) -> Option<usize> {
        self.config.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let mut vectors = self.request_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| PipelineError::embedding(self.name(), "empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.max_batch_size) {
            vectors.extend(self.request_batch(batch).await?);
        }
        Ok(vectors)
    }
}
