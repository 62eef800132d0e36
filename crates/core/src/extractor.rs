use crate::error::PipelineError;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait DocumentExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, PipelineError>;

    /// All page text as one blob: whitespace runs (newlines included) become a
    /// single space and pages are joined by one space.
    fn extract_text(&self, path: &Path) -> Result<String, PipelineError> {
        let pages = self.extract_pages(path)?;
        Ok(join_pages(&pages))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl DocumentExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, PipelineError> {
        let document = Document::load(path).map_err(|error| {
            PipelineError::DocumentRead(format!("{}: {error}", path.display()))
        })?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document.extract_text(&[page_no]).map_err(|error| {
                PipelineError::DocumentRead(format!(
                    "{} page {page_no}: {error}",
                    path.display()
                ))
            })?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(PipelineError::DocumentRead(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| normalize_whitespace(&page.text))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{join_pages, normalize_whitespace, DocumentExtractor, LopdfExtractor, PageText};
    use crate::error::PipelineError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn whitespace_is_normalized() {
        assert_eq!(
            normalize_whitespace("Senior\nRust\t\tEngineer\u{a0} "),
            "Senior Rust Engineer"
        );
    }

    #[test]
    fn pages_join_with_single_separator() {
        let pages = vec![
            PageText {
                number: 1,
                text: "Jane Doe\nBackend".to_string(),
            },
            PageText {
                number: 2,
                text: "\n\nRust, Go\n".to_string(),
            },
        ];

        assert_eq!(join_pages(&pages), "Jane Doe Backend Rust, Go");
    }

    #[test]
    fn corrupt_pdf_is_a_document_read_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = LopdfExtractor.extract_text(&path);

        assert!(matches!(result, Err(PipelineError::DocumentRead(_))));
        Ok(())
    }

    #[test]
    fn missing_file_is_a_document_read_error() {
        let result = LopdfExtractor.extract_text(std::path::Path::new("/nonexistent/cv.pdf"));
        assert!(matches!(result, Err(PipelineError::DocumentRead(_))));
    }
}
