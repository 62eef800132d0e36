use crate::models::PipelineStage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("document read error: {0}")]
    DocumentRead(String),

    #[error("embedding provider {provider} failed: {message}")]
    EmbeddingProvider { provider: String, message: String },

    #[error("generation provider {provider} failed: {message}")]
    GenerationProvider { provider: String, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("stage {attempted:?} cannot run from {current:?}")]
    InvalidStage {
        attempted: PipelineStage,
        current: PipelineStage,
    },
}

impl PipelineError {
    pub fn embedding(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::EmbeddingProvider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn generation(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::GenerationProvider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Short, user-facing description that omits provider internals.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::DocumentRead(_) => "The uploaded document could not be read as a PDF.",
            Self::EmbeddingProvider { .. } => "The embedding service is unavailable.",
            Self::GenerationProvider { .. } => "The cover letter could not be generated.",
            Self::Configuration(_) => "The job catalog is misconfigured.",
            Self::InvalidStage { .. } => "The matching pipeline failed.",
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
