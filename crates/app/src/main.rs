use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dry_run::DryRunGenerator;
use resume_match_core::{
    CharacterNgramEmbedder, ChatCompletionsGenerator, ChatGenerationConfig, EmbeddingProvider,
    GenerationProvider, HttpEmbeddingConfig, HttpEmbeddingProvider, JobCatalog, LopdfExtractor,
    MatchOutcome, PipelineError, PipelineOptions, ResumeMatcher, DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod dry_run;

#[derive(Parser)]
#[command(name = "resume-match", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    providers: ProviderArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Local hashed character-trigram embedder.
    Ngram,
    /// OpenAI-compatible embeddings endpoint.
    Http,
}

#[derive(Clone, Copy, ValueEnum)]
enum GeneratorKind {
    /// OpenAI-compatible chat completions endpoint.
    Chat,
    /// Print the prompt instead of calling a model.
    DryRun,
}

#[derive(Args)]
struct ProviderArgs {
    /// Embedding backend used for the catalog and the résumé.
    #[arg(long, value_enum, env = "RESUME_MATCH_EMBEDDER", default_value = "ngram")]
    embedder: EmbedderKind,

    /// Vector size for the ngram embedder.
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    ngram_dimensions: usize,

    /// Embeddings API base URL
    #[arg(long, env = "RESUME_MATCH_EMBEDDING_URL", default_value = "https://api.openai.com/v1")]
    embedding_url: String,

    /// Embeddings model name
    #[arg(long, env = "RESUME_MATCH_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Embeddings API key
    #[arg(long, env = "RESUME_MATCH_EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Maximum number of texts per embeddings request.
    #[arg(long, default_value = "96")]
    embedding_batch_size: usize,

    /// Generation backend used for the cover letter.
    #[arg(long, value_enum, env = "RESUME_MATCH_GENERATOR", default_value = "chat")]
    generator: GeneratorKind,

    /// Chat completions API base URL
    #[arg(long, env = "RESUME_MATCH_GENERATION_URL", default_value = "https://api.openai.com/v1")]
    generation_url: String,

    /// Chat model name
    #[arg(long, env = "RESUME_MATCH_GENERATION_MODEL", default_value = "gpt-4o-mini")]
    generation_model: String,

    /// Chat completions API key
    #[arg(long, env = "RESUME_MATCH_GENERATION_API_KEY", hide_env_values = true)]
    generation_api_key: Option<String>,

    /// Sampling temperature for the cover letter.
    #[arg(long, default_value = "0.2")]
    temperature: f32,

    /// Per-request timeout for provider calls, in seconds.
    #[arg(long, default_value = "120")]
    timeout_secs: u64,
}

#[derive(Args)]
struct RunArgs {
    /// Résumé PDF, or `-` to read it from stdin.
    #[arg(long)]
    resume: String,

    /// JSON array of jobs with title, company and description.
    #[arg(long, env = "RESUME_MATCH_JOBS", default_value = "jobs.json")]
    jobs: PathBuf,

    /// Number of matches to keep.
    #[arg(long, default_value = "3")]
    top_k: usize,

    /// Characters of résumé text embedded for matching.
    #[arg(long, default_value = "3000")]
    embedding_prefix_chars: usize,

    /// Characters of résumé text quoted in the cover letter prompt.
    #[arg(long, default_value = "2000")]
    prompt_prefix_chars: usize,

    /// Emit `{"matched_jobs": [...], "cover_letter": ...}` as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Rank jobs against a résumé and draft a cover letter for the best match.
    Match(RunArgs),
    /// Rank jobs against a résumé without generating a letter.
    Rank(RunArgs),
}

/// A résumé that is readable from disk for the duration of one run. Stdin
/// uploads live in a temporary file removed on drop.
enum ResumeUpload {
    File(PathBuf),
    Temporary(NamedTempFile),
}

impl ResumeUpload {
    async fn open(resume: &str) -> anyhow::Result<Self> {
        if resume == "-" {
            let mut bytes = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut bytes)
                .await
                .context("failed to read résumé from stdin")?;
            anyhow::ensure!(!bytes.is_empty(), "no résumé received on stdin");

            let mut file = tempfile::Builder::new()
                .prefix("resume-")
                .suffix(".pdf")
                .tempfile()
                .context("failed to create temporary résumé file")?;
            file.write_all(&bytes)?;
            file.flush()?;
            return Ok(Self::Temporary(file));
        }

        let path = PathBuf::from(resume);
        anyhow::ensure!(is_pdf(&path), "Only PDF files are supported.");
        Ok(Self::File(path))
    }

    fn path(&self) -> &Path {
        match self {
            Self::File(path) => path,
            Self::Temporary(file) => file.path(),
        }
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn build_embedder(args: &ProviderArgs) -> Result<Box<dyn EmbeddingProvider>, PipelineError> {
    match args.embedder {
        EmbedderKind::Ngram => Ok(Box::new(CharacterNgramEmbedder {
            dimensions: args.ngram_dimensions,
        })),
        EmbedderKind::Http => Ok(Box::new(HttpEmbeddingProvider::new(HttpEmbeddingConfig {
            base_url: args.embedding_url.clone(),
            model: args.embedding_model.clone(),
            api_key: args.embedding_api_key.clone(),
            dimensions: None,
            max_batch_size: args.embedding_batch_size,
            timeout: Duration::from_secs(args.timeout_secs),
        })?)),
    }
}

fn build_generator(args: &ProviderArgs) -> Result<Box<dyn GenerationProvider>, PipelineError> {
    match args.generator {
        GeneratorKind::Chat => Ok(Box::new(ChatCompletionsGenerator::new(
            ChatGenerationConfig {
                base_url: args.generation_url.clone(),
                model: args.generation_model.clone(),
                api_key: args.generation_api_key.clone(),
                temperature: args.temperature,
                max_tokens: None,
                timeout: Duration::from_secs(args.timeout_secs),
            },
        )?)),
        GeneratorKind::DryRun => Ok(Box::new(DryRunGenerator)),
    }
}

fn public_failure(error: PipelineError) -> anyhow::Error {
    error!(error = %error, "pipeline failed");
    anyhow::anyhow!(error.public_message())
}

fn print_outcome(outcome: &MatchOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    if outcome.matched_jobs.is_empty() {
        println!("no matching jobs");
    }
    for (rank, scored) in outcome.matched_jobs.iter().enumerate() {
        println!(
            "[{}] similarity={:.4} title={} company={}",
            rank + 1,
            scored.similarity,
            scored.job.title,
            scored.job.company
        );
    }
    if let Some(letter) = &outcome.cover_letter {
        println!("cover_letter:\n{letter}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "resume-match boot"
    );

    let (run, generate) = match cli.command {
        Command::Match(run) => (run, true),
        Command::Rank(run) => (run, false),
    };

    let upload = ResumeUpload::open(&run.resume).await?;
    let embedder = build_embedder(&cli.providers).map_err(public_failure)?;
    let generator = build_generator(&cli.providers).map_err(public_failure)?;

    let catalog = JobCatalog::load_json(&run.jobs, &embedder)
        .await
        .map_err(public_failure)?;
    info!(jobs = catalog.len(), path = %run.jobs.display(), "system ready");

    let matcher = ResumeMatcher::new(LopdfExtractor, embedder, generator).with_options(
        PipelineOptions {
            embedding_prefix_chars: run.embedding_prefix_chars,
            prompt_prefix_chars: run.prompt_prefix_chars,
            top_k: run.top_k,
            ..PipelineOptions::default()
        },
    );

    let result = if generate {
        matcher.run(upload.path(), &catalog).await
    } else {
        matcher.run_matching(upload.path(), &catalog).await
    };
    drop(upload);

    let outcome = result.map_err(public_failure)?.into_outcome();
    print_outcome(&outcome, run.json)
}
