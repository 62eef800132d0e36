use async_trait::async_trait;
use resume_match_core::{GenerationProvider, PipelineError};

/// Returns the prompt itself so a run can be inspected without a model.
pub struct DryRunGenerator;

#[async_trait]
impl GenerationProvider for DryRunGenerator {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        Ok(format!("[dry run] prompt that would be sent:\n{prompt}"))
    }
}

#[cfg(test)]
mod tests {
    use super::DryRunGenerator;
    use resume_match_core::GenerationProvider;

    #[tokio::test]
    async fn dry_run_echoes_prompt() {
        let letter = DryRunGenerator
            .generate("Write a letter")
            .await
            .expect("dry run never fails");
        assert!(letter.ends_with("Write a letter"));
    }
}
