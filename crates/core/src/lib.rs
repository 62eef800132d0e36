pub mod catalog;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod models;
pub mod orchestrator;
pub mod ranker;

pub use catalog::{parse_records, JobCatalog};
pub use embeddings::{
    CharacterNgramEmbedder, EmbeddingProvider, HttpEmbeddingConfig, HttpEmbeddingProvider,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{PipelineError, Result};
pub use extractor::{join_pages, normalize_whitespace, DocumentExtractor, LopdfExtractor, PageText};
pub use generation::{
    cover_letter_prompt, ChatCompletionsGenerator, ChatGenerationConfig, GenerationProvider,
};
pub use models::{
    char_prefix, JobPosting, JobRecord, MatchOutcome, PipelineOptions, PipelineStage,
    PipelineState, ScoredJobPosting, NO_MATCH_MESSAGE,
};
pub use orchestrator::ResumeMatcher;
pub use ranker::{cosine_similarity, top_k, Ranked};
