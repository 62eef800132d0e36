use crate::catalog::JobCatalog;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const NO_MATCH_MESSAGE: &str = "No suitable jobs found to generate a letter for.";

/// Metadata keys owned by the catalog and the ranking projection. Source
/// records may not carry them through.
pub(crate) const RESERVED_METADATA_KEYS: [&str; 2] = ["embedding", "similarity"];

/// A job as supplied by the catalog source. `title`, `company` and
/// `description` are required; every other key is carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct JobRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl JobRecord {
    pub fn new(
        title: impl Into<String>,
        company: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
            description: description.into(),
            metadata: Map::new(),
        }
    }

    pub fn missing_required_field(&self) -> Option<&'static str> {
        [
            ("title", &self.title),
            ("company", &self.company),
            ("description", &self.description),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// A catalog entry: the public record plus its precomputed embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPosting {
    record: JobRecord,
    embedding: Option<Vec<f32>>,
}

impl JobPosting {
    pub fn new(record: JobRecord, embedding: Option<Vec<f32>>) -> Self {
        Self { record, embedding }
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    pub fn title(&self) -> &str {
        &self.record.title
    }

    /// `None` when the posting has no vector, or an empty one.
    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding
            .as_deref()
            .filter(|embedding| !embedding.is_empty())
    }

    /// Copies the public fields out; the embedding never leaves the catalog.
    pub fn project(&self, similarity: f32) -> ScoredJobPosting {
        let mut job = self.record.clone();
        for key in RESERVED_METADATA_KEYS {
            job.metadata.remove(key);
        }
        ScoredJobPosting { job, similarity }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredJobPosting {
    #[serde(flatten)]
    pub job: JobRecord,
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Start,
    Extracted,
    Embedded,
    Matched,
    Generated,
    Failed,
}

/// Per-run record threaded through the pipeline. Fields are only written by
/// the stage that owns them, in stage order.
#[derive(Debug, Clone)]
pub struct PipelineState<'a> {
    pub(crate) run_id: Uuid,
    pub(crate) resume_path: PathBuf,
    pub(crate) catalog: &'a JobCatalog,
    pub(crate) stage: PipelineStage,
    pub(crate) resume_text: String,
    pub(crate) resume_embedding: Vec<f32>,
    pub(crate) matched_jobs: Vec<ScoredJobPosting>,
    pub(crate) cover_letter: Option<String>,
}

impl<'a> PipelineState<'a> {
    pub fn new(resume_path: impl Into<PathBuf>, catalog: &'a JobCatalog) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            resume_path: resume_path.into(),
            catalog,
            stage: PipelineStage::Start,
            resume_text: String::new(),
            resume_embedding: Vec::new(),
            matched_jobs: Vec::new(),
            cover_letter: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn resume_path(&self) -> &Path {
        &self.resume_path
    }

    pub fn catalog(&self) -> &'a JobCatalog {
        self.catalog
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn resume_text(&self) -> &str {
        &self.resume_text
    }

    pub fn resume_embedding(&self) -> &[f32] {
        &self.resume_embedding
    }

    pub fn matched_jobs(&self) -> &[ScoredJobPosting] {
        &self.matched_jobs
    }

    pub fn cover_letter(&self) -> Option<&str> {
        self.cover_letter.as_deref()
    }

    pub fn into_outcome(self) -> MatchOutcome {
        MatchOutcome {
            matched_jobs: self.matched_jobs,
            cover_letter: self.cover_letter,
        }
    }
}

/// What the request layer hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchOutcome {
    pub matched_jobs: Vec<ScoredJobPosting>,
    pub cover_letter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub embedding_prefix_chars: usize,
    pub prompt_prefix_chars: usize,
    pub top_k: usize,
    pub no_match_message: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            embedding_prefix_chars: 3_000,
            prompt_prefix_chars: 2_000,
            top_k: 3,
            no_match_message: NO_MATCH_MESSAGE.to_string(),
        }
    }
}

pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
