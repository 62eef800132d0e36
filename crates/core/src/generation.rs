use crate::error::PipelineError;
use crate::models::{char_prefix, JobRecord};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// One prompt in, one block of freeform text out. Retries and streaming are
/// left to callers.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError>;
}

#[async_trait]
impl<T> GenerationProvider for Box<T>
where
    T: GenerationProvider + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        (**self).generate(prompt).await
    }
}

pub fn cover_letter_prompt(job: &JobRecord, resume_text: &str, resume_prefix_chars: usize) -> String {
    format!(
        "Write a professional cover letter for the position of '{title}' at '{company}'.\n\
         Use the following details from the candidate's resume:\n{resume}...\n\n\
         And relate them to the job description: {description}\n\
         Keep it concise, enthusiastic, and professional.",
        title = job.title,
        company = job.company,
        resume = char_prefix(resume_text, resume_prefix_chars),
        description = job.description,
    )
}

#[derive(Debug, Clone)]
pub struct ChatGenerationConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for ChatGenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.2,
            max_tokens: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct ChatCompletionsGenerator {
    client: Client,
    endpoint: Url,
    config: ChatGenerationConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsGenerator {
    pub fn new(config: ChatGenerationConfig) -> Result<Self, PipelineError> {
        if config.model.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "generation model name is empty".to_string(),
            ));
        }

        let endpoint = Url::parse(&format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        ))
        .map_err(|error| {
            PipelineError::Configuration(format!(
                "invalid generation url {}: {error}",
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
}

fn first_completion(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .filter_map(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
}

#[async_trait]
impl GenerationProvider for ChatCompletionsGenerator {
    fn name(&self) -> &str {
        "chat"
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        debug!(
            provider = self.name(),
            model = %self.config.model,
            prompt_chars = prompt.chars().count(),
            "requesting completion"
        );

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .json(&ChatRequest {
                model: &self.config.model,
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
                messages: [ChatMessage {
                    role: "user",
                    content: prompt,
                }],
            });

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| PipelineError::generation(self.name(), error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::generation(
                self.name(),
                format!("{} returned {status}: {body}", self.endpoint),
            ));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|error| PipelineError::generation(self.name(), error))?;

        first_completion(payload)
            .ok_or_else(|| PipelineError::generation(self.name(), "completion was empty"))
    }
}
