use crate::catalog::JobCatalog;
use crate::embeddings::EmbeddingProvider;
use crate::error::PipelineError;
use crate::extractor::DocumentExtractor;
use crate::generation::{cover_letter_prompt, GenerationProvider};
use crate::models::{char_prefix, PipelineOptions, PipelineStage, PipelineState};
use std::path::Path;
use tracing::{debug, info, warn};

/// Runs extract → embed → rank → generate over one résumé. Holds no per-run
/// state, so one matcher can serve concurrent runs.
pub struct ResumeMatcher<X, E, G>
where
    X: DocumentExtractor,
    E: EmbeddingProvider,
    G: GenerationProvider,
{
    extractor: X,
    embedder: E,
    generator: G,
    options: PipelineOptions,
}

impl<X, E, G> ResumeMatcher<X, E, G>
where
    X: DocumentExtractor,
    E: EmbeddingProvider,
    G: GenerationProvider,
{
    pub fn new(extractor: X, embedder: E, generator: G) -> Self {
        Self {
            extractor,
            embedder,
            generator,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Full run. Any stage error aborts the remaining stages and is returned
    /// as-is; no partial state escapes.
    pub async fn run<'a>(
        &self,
        resume_path: &Path,
        catalog: &'a JobCatalog,
    ) -> Result<PipelineState<'a>, PipelineError> {
        let mut state = self.run_matching(resume_path, catalog).await?;
        self.generate(&mut state).await?;
        Ok(state)
    }

    /// Stops after ranking; `cover_letter` stays unset.
    pub async fn run_matching<'a>(
        &self,
        resume_path: &Path,
        catalog: &'a JobCatalog,
    ) -> Result<PipelineState<'a>, PipelineError> {
        let mut state = PipelineState::new(resume_path, catalog);
        debug!(run_id = %state.run_id, path = %resume_path.display(), jobs = catalog.len(), "pipeline start");

        self.extract(&mut state)?;
        self.embed(&mut state).await?;
        self.rank(&mut state)?;
        Ok(state)
    }

    pub fn extract(&self, state: &mut PipelineState<'_>) -> Result<(), PipelineError> {
        enter(state, PipelineStage::Start, PipelineStage::Extracted)?;

        let text = self
            .extractor
            .extract_text(&state.resume_path)
            .map_err(|error| fail(state, PipelineStage::Extracted, error))?;

        info!(run_id = %state.run_id, chars = text.chars().count(), "resume extracted");
        state.resume_text = text;
        state.stage = PipelineStage::Extracted;
        Ok(())
    }

    pub async fn embed(&self, state: &mut PipelineState<'_>) -> Result<(), PipelineError> {
        enter(state, PipelineStage::Extracted, PipelineStage::Embedded)?;

        let summary = char_prefix(&state.resume_text, self.options.embedding_prefix_chars);
        let embedding = match self.embedder.embed(summary).await {
            Ok(embedding) => embedding,
            Err(error) => return Err(fail(state, PipelineStage::Embedded, error)),
        };

        info!(
            run_id = %state.run_id,
            provider = self.embedder.name(),
            dimension = embedding.len(),
            "resume embedded"
        );
        state.resume_embedding = embedding;
        state.stage = PipelineStage::Embedded;
        Ok(())
    }

    pub fn rank(&self, state: &mut PipelineState<'_>) -> Result<(), PipelineError> {
        enter(state, PipelineStage::Embedded, PipelineStage::Matched)?;

        let matches = state
            .catalog
            .rank(&state.resume_embedding, self.options.top_k);

        info!(
            run_id = %state.run_id,
            candidates = state.catalog.len(),
            matches = matches.len(),
            top = matches.first().map(|job| job.job.title.as_str()).unwrap_or("-"),
            "jobs ranked"
        );
        state.matched_jobs = matches;
        state.stage = PipelineStage::Matched;
        Ok(())
    }

    pub async fn generate(&self, state: &mut PipelineState<'_>) -> Result<(), PipelineError> {
        enter(state, PipelineStage::Matched, PipelineStage::Generated)?;

        let Some(top_job) = state.matched_jobs.first() else {
            info!(run_id = %state.run_id, "no matches, skipping generation");
            state.cover_letter = Some(self.options.no_match_message.clone());
            state.stage = PipelineStage::Generated;
            return Ok(());
        };

        let prompt = cover_letter_prompt(
            &top_job.job,
            &state.resume_text,
            self.options.prompt_prefix_chars,
        );
        let letter = match self.generator.generate(&prompt).await {
            Ok(letter) => letter,
            Err(error) => return Err(fail(state, PipelineStage::Generated, error)),
        };

        info!(
            run_id = %state.run_id,
            provider = self.generator.name(),
            chars = letter.chars().count(),
            "cover letter generated"
        );
        state.cover_letter = Some(letter);
        state.stage = PipelineStage::Generated;
        Ok(())
    }
}

fn enter(
    state: &PipelineState<'_>,
    expected: PipelineStage,
    attempted: PipelineStage,
) -> Result<(), PipelineError> {
    if state.stage == expected {
        Ok(())
    } else {
        Err(PipelineError::InvalidStage {
            attempted,
            current: state.stage,
        })
    }
}

fn fail(state: &mut PipelineState<'_>, stage: PipelineStage, error: PipelineError) -> PipelineError {
    warn!(run_id = %state.run_id, stage = ?stage, error = %error, "pipeline failed");
    state.stage = PipelineStage::Failed;
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PageText;
    use crate::models::{JobPosting, JobRecord, NO_MATCH_MESSAGE};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedText(String);

    impl DocumentExtractor for FixedText {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, PipelineError> {
            Ok(vec![PageText {
                number: 1,
                text: self.0.clone(),
            }])
        }
    }

    #[derive(Default)]
    struct AxisEmbedder {
        inputs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        fn name(&self) -> &str {
            "axis"
        }

        fn dimensions(&self) -> Option<usize> {
            Some(2)
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
            if let Ok(mut inputs) = self.inputs.lock() {
                inputs.push(text.to_string());
            }
            Ok(vec![1.0, 0.0])
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerationProvider for RecordingGenerator {
        fn name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            Ok("Dear hiring team".to_string())
        }
    }

    struct UnavailableEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnavailableEmbedder {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn dimensions(&self) -> Option<usize> {
            None
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
            Err(PipelineError::embedding("unavailable", "connection refused"))
        }
    }

    struct BrokenGenerator;

    #[async_trait]
    impl GenerationProvider for BrokenGenerator {
        fn name(&self) -> &str {
            "broken"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, PipelineError> {
            Err(PipelineError::generation("broken", "503"))
        }
    }

    fn two_job_catalog() -> JobCatalog {
        JobCatalog::from_postings(vec![
            JobPosting::new(
                JobRecord::new("A", "Acme", "Build Rust services"),
                Some(vec![1.0, 0.0]),
            ),
            JobPosting::new(JobRecord::new("Ghost", "Nowhere", "No vector"), None),
            JobPosting::new(
                JobRecord::new("B", "Globex", "Write SQL"),
                Some(vec![0.0, 1.0]),
            ),
        ])
    }

    #[tokio::test]
    async fn full_run_ranks_and_generates_for_top_match() -> Result<(), PipelineError> {
        let matcher = ResumeMatcher::new(
            FixedText("Jane\nDoe".to_string()),
            AxisEmbedder::default(),
            RecordingGenerator::default(),
        );
        let catalog = two_job_catalog();

        let state = matcher.run(Path::new("resume.pdf"), &catalog).await?;

        assert_eq!(state.stage(), PipelineStage::Generated);
        assert_eq!(state.resume_text(), "Jane Doe");
        let titles = state
            .matched_jobs()
            .iter()
            .map(|job| job.job.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(state.cover_letter(), Some("Dear hiring team"));

        let prompts = matcher.generator.prompts.lock().map(|p| p.clone()).unwrap_or_default();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("'A' at 'Acme'"));
        assert!(prompts[0].contains("Build Rust services"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_catalog_yields_sentinel_without_generation() -> Result<(), PipelineError> {
        let matcher = ResumeMatcher::new(
            FixedText("resume".to_string()),
            AxisEmbedder::default(),
            RecordingGenerator::default(),
        );
        let catalog = JobCatalog::default();

        let state = matcher.run(Path::new("resume.pdf"), &catalog).await?;

        assert!(state.matched_jobs().is_empty());
        assert_eq!(state.cover_letter(), Some(NO_MATCH_MESSAGE));
        assert_eq!(
            state.cover_letter(),
            Some("No suitable jobs found to generate a letter for.")
        );
        assert_eq!(matcher.generator.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn catalog_without_embeddings_yields_sentinel() -> Result<(), PipelineError> {
        let matcher = ResumeMatcher::new(
            FixedText("resume".to_string()),
            AxisEmbedder::default(),
            RecordingGenerator::default(),
        );
        let catalog = JobCatalog::from_postings(vec![JobPosting::new(
            JobRecord::new("Ghost", "Nowhere", "No vector"),
            None,
        )]);

        let state = matcher.run(Path::new("resume.pdf"), &catalog).await?;

        assert_eq!(state.cover_letter(), Some(NO_MATCH_MESSAGE));
        assert_eq!(matcher.generator.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn embedding_and_prompt_use_bounded_prefixes() -> Result<(), PipelineError> {
        let resume = "a".repeat(5_000);
        let matcher = ResumeMatcher::new(
            FixedText(resume),
            AxisEmbedder::default(),
            RecordingGenerator::default(),
        );
        let catalog = two_job_catalog();

        let state = matcher.run(Path::new("resume.pdf"), &catalog).await?;

        assert_eq!(state.resume_text().len(), 5_000);
        let inputs = matcher.embedder.inputs.lock().map(|i| i.clone()).unwrap_or_default();
        assert_eq!(inputs, vec!["a".repeat(3_000)]);
        let prompts = matcher.generator.prompts.lock().map(|p| p.clone()).unwrap_or_default();
        assert!(prompts[0].contains(&format!("{}...", "a".repeat(2_000))));
        assert!(!prompts[0].contains(&"a".repeat(2_001)));
        Ok(())
    }

    #[tokio::test]
    async fn top_k_is_configurable() -> Result<(), PipelineError> {
        let matcher = ResumeMatcher::new(
            FixedText("resume".to_string()),
            AxisEmbedder::default(),
            RecordingGenerator::default(),
        )
        .with_options(PipelineOptions {
            top_k: 1,
            ..PipelineOptions::default()
        });
        let catalog = two_job_catalog();

        let state = matcher.run_matching(Path::new("resume.pdf"), &catalog).await?;

        assert_eq!(state.stage(), PipelineStage::Matched);
        assert_eq!(state.matched_jobs().len(), 1);
        assert_eq!(state.cover_letter(), None);
        Ok(())
    }

    #[tokio::test]
    async fn generation_failure_aborts_run() {
        let matcher = ResumeMatcher::new(
            FixedText("resume".to_string()),
            AxisEmbedder::default(),
            BrokenGenerator,
        );
        let catalog = two_job_catalog();

        let result = matcher.run(Path::new("resume.pdf"), &catalog).await;

        assert!(matches!(
            result,
            Err(PipelineError::GenerationProvider { .. })
        ));
    }

    #[tokio::test]
    async fn embedding_failure_aborts_run_before_generation() {
        let matcher = ResumeMatcher::new(
            FixedText("resume".to_string()),
            UnavailableEmbedder,
            RecordingGenerator::default(),
        );
        let catalog = two_job_catalog();

        let result = matcher.run(Path::new("resume.pdf"), &catalog).await;
        assert!(matches!(
            result,
            Err(PipelineError::EmbeddingProvider { .. })
        ));

        let mut state = PipelineState::new("resume.pdf", &catalog);
        assert!(matcher.extract(&mut state).is_ok());
        assert!(matches!(
            matcher.embed(&mut state).await,
            Err(PipelineError::EmbeddingProvider { .. })
        ));
        assert_eq!(state.stage(), PipelineStage::Failed);
        assert!(state.resume_embedding().is_empty());
        assert!(matches!(
            matcher.rank(&mut state),
            Err(PipelineError::InvalidStage {
                attempted: PipelineStage::Matched,
                current: PipelineStage::Failed,
            })
        ));
        assert_eq!(matcher.generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stages_refuse_to_run_out_of_order() {
        let matcher = ResumeMatcher::new(
            FixedText("resume".to_string()),
            AxisEmbedder::default(),
            RecordingGenerator::default(),
        );
        let catalog = two_job_catalog();
        let mut state = PipelineState::new("resume.pdf", &catalog);

        let result = matcher.rank(&mut state);

        assert!(matches!(
            result,
            Err(PipelineError::InvalidStage {
                attempted: PipelineStage::Matched,
                current: PipelineStage::Start,
            })
        ));
        assert_eq!(state.stage(), PipelineStage::Start);
        assert!(matcher.embedder.inputs.lock().map(|i| i.is_empty()).unwrap_or(false));
    }

    #[tokio::test]
    async fn failed_stage_marks_state_failed() {
        let matcher = ResumeMatcher::new(
            FixedText("resume".to_string()),
            AxisEmbedder::default(),
            BrokenGenerator,
        );
        let catalog = two_job_catalog();
        let mut state = PipelineState::new("resume.pdf", &catalog);

        assert!(matcher.extract(&mut state).is_ok());
        assert!(matcher.embed(&mut state).await.is_ok());
        assert!(matcher.rank(&mut state).is_ok());
        assert!(matcher.generate(&mut state).await.is_err());
        assert_eq!(state.stage(), PipelineStage::Failed);
        assert!(matches!(
            matcher.generate(&mut state).await,
            Err(PipelineError::InvalidStage { .. })
        ));
    }
}
