use crate::embeddings::EmbeddingProvider;
use crate::error::PipelineError;
use crate::models::{JobPosting, JobRecord, ScoredJobPosting, RESERVED_METADATA_KEYS};
use crate::ranker;
use std::path::Path;
use tracing::{info, warn};

/// Job postings with their embeddings, built once before any run and only
/// read afterwards. Share it by reference or behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct JobCatalog {
    postings: Vec<JobPosting>,
}

impl JobCatalog {
    /// Wraps postings that already carry embeddings. Postings without one are
    /// kept and skipped at ranking time.
    pub fn from_postings(postings: Vec<JobPosting>) -> Self {
        Self { postings }
    }

    /// Validates `records` and attaches embeddings of their descriptions,
    /// computed with a single batch call.
    pub async fn from_records<P>(records: Vec<JobRecord>, provider: &P) -> Result<Self, PipelineError>
    where
        P: EmbeddingProvider + ?Sized,
    {
        let records = validate_records(records)?;
        if records.is_empty() {
            warn!("job catalog is empty");
            return Ok(Self::default());
        }

        let descriptions = records
            .iter()
            .map(|record| record.description.as_str())
            .collect::<Vec<_>>();
        let embeddings = provider.embed_batch(&descriptions).await?;

        if embeddings.len() != records.len() {
            return Err(PipelineError::embedding(
                provider.name(),
                format!(
                    "embedding count {} doesn't match job count {}",
                    embeddings.len(),
                    records.len()
                ),
            ));
        }

        let dimension = embeddings.first().map(Vec::len).unwrap_or_default();
        if let Some((index, embedding)) = embeddings
            .iter()
            .enumerate()
            .find(|(_, embedding)| embedding.len() != dimension)
        {
            return Err(PipelineError::Configuration(format!(
                "job {index} embedding dimension {} != {dimension}",
                embedding.len()
            )));
        }

        let postings = records
            .into_iter()
            .zip(embeddings)
            .map(|(record, embedding)| JobPosting::new(record, Some(embedding)))
            .collect::<Vec<_>>();

        info!(
            jobs = postings.len(),
            dimension,
            provider = provider.name(),
            "job catalog embedded"
        );

        Ok(Self { postings })
    }

    /// Reads a JSON array of job records from `path` and embeds it.
    pub async fn load_json<P>(path: &Path, provider: &P) -> Result<Self, PipelineError>
    where
        P: EmbeddingProvider + ?Sized,
    {
        let raw = tokio::fs::read_to_string(path).await.map_err(|error| {
            PipelineError::Configuration(format!(
                "cannot read job catalog {}: {error}",
                path.display()
            ))
        })?;
        let records = parse_records(&raw)?;
        Self::from_records(records, provider).await
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn postings(&self) -> &[JobPosting] {
        &self.postings
    }

    /// Top `k` postings by cosine similarity to `query`, projected without
    /// their embeddings. The catalog itself is left untouched.
    pub fn rank(&self, query: &[f32], k: usize) -> Vec<ScoredJobPosting> {
        let candidates = self
            .postings
            .iter()
            .map(|posting| (posting, posting.embedding()));

        ranker::top_k(query, candidates, k)
            .into_iter()
            .map(|ranked| ranked.item.project(ranked.similarity))
            .collect()
    }
}

pub fn parse_records(raw: &str) -> Result<Vec<JobRecord>, PipelineError> {
    serde_json::from_str(raw).map_err(|error| {
        PipelineError::Configuration(format!("job catalog is not a JSON array of jobs: {error}"))
    })
}

fn validate_records(records: Vec<JobRecord>) -> Result<Vec<JobRecord>, PipelineError> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, mut record)| {
            if let Some(field) = record.missing_required_field() {
                return Err(PipelineError::Configuration(format!(
                    "job {index} is missing required field `{field}`"
                )));
            }
            for key in RESERVED_METADATA_KEYS {
                if record.metadata.remove(key).is_some() {
                    warn!(job = index, key, "dropping reserved key from job record");
                }
            }
            Ok(record)
        })
        .collect()
}
