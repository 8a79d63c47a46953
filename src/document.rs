//! Document representation for PageIndex.
//!
//! Documents are represented as an ordered run of page units. PDF pages map
//! one-to-one onto physical pages; plain text is cut into synthetic pages by
//! the [segmenter](crate::segmenter). Physical indices start at 0 and have no
//! gaps.

use crate::config::IndexConfig;
use crate::error::{PageIndexError, Result};
use crate::pdf::PdfTextExtractor;
use crate::segmenter::segment_text;
use crate::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A single page of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageUnit {
    /// 0-indexed physical page number.
    pub physical_index: usize,
    /// Text content of the page.
    pub text: String,
    /// Token count of `text` under the configured tokenizer.
    pub token_count: usize,
    /// Byte length of the prefix of `text` repeated from the previous page.
    #[serde(default)]
    pub overlap: usize,
}

impl PageUnit {
    /// Create a page with no overlap.
    pub fn new(physical_index: usize, text: String, token_count: usize) -> Self {
        Self {
            physical_index,
            text,
            token_count,
            overlap: 0,
        }
    }

    /// The part of the page not shared with the previous page.
    pub fn fresh_text(&self) -> &str {
        self.text.get(self.overlap..).unwrap_or(&self.text)
    }

    /// Format page content with physical index tags for LLM processing.
    pub fn with_index_tags(&self) -> String {
        format!(
            "<physical_index_{}>\n{}\n<physical_index_{}>\n\n",
            self.physical_index, self.text, self.physical_index
        )
    }
}

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Text,
}

impl DocumentFormat {
    /// Determine the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => Ok(DocumentFormat::Pdf),
            Some("txt") => Ok(DocumentFormat::Text),
            Some(other) => Err(PageIndexError::UnsupportedFormat(format!(
                "'.{}' (supported: .pdf, .txt)",
                other
            ))),
            None => Err(PageIndexError::UnsupportedFormat(format!(
                "'{}' has no extension (supported: .pdf, .txt)",
                path.display()
            ))),
        }
    }
}

/// A document consisting of one or more pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document name/title.
    pub name: String,
    /// Original file path (if loaded from file).
    pub path: Option<PathBuf>,
    /// Pages in the document.
    pub pages: Vec<PageUnit>,
}

impl Document {
    /// Create a document from prepared pages.
    pub fn new(name: impl Into<String>, pages: Vec<PageUnit>) -> Result<Self> {
        let name = name.into();
        if pages.is_empty() {
            return Err(PageIndexError::EmptyDocument(name));
        }
        Ok(Self {
            name,
            path: None,
            pages,
        })
    }

    /// Create a document with one page per string, counting tokens with `tokenizer`.
    pub fn from_page_texts(
        name: impl Into<String>,
        texts: Vec<String>,
        tokenizer: &dyn Tokenizer,
    ) -> Result<Self> {
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let token_count = tokenizer.count(&text);
                PageUnit::new(i, text, token_count)
            })
            .collect();
        Self::new(name, pages)
    }

    /// Load a `.pdf` or `.txt` file.
    pub fn from_path(
        path: &Path,
        config: &IndexConfig,
        tokenizer: &dyn Tokenizer,
        pdf: &dyn PdfTextExtractor,
    ) -> Result<Self> {
        let format = DocumentFormat::from_path(path)?;
        if !path.exists() {
            return Err(PageIndexError::DocumentNotFound(path.to_path_buf()));
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();

        let mut document = match format {
            DocumentFormat::Pdf => {
                let bytes = std::fs::read(path).map_err(|e| PageIndexError::io(path, e))?;
                Self::from_pdf_bytes(name, &bytes, pdf, tokenizer)?
            }
            DocumentFormat::Text => {
                let content =
                    std::fs::read_to_string(path).map_err(|e| PageIndexError::io(path, e))?;
                Self::from_text(name, &content, config, tokenizer)?
            }
        };
        document.path = Some(path.to_path_buf());
        Ok(document)
    }

    /// Decode a PDF into one page unit per physical page.
    pub fn from_pdf_bytes(
        name: impl Into<String>,
        bytes: &[u8],
        pdf: &dyn PdfTextExtractor,
        tokenizer: &dyn Tokenizer,
    ) -> Result<Self> {
        let name = name.into();
        let texts = pdf.extract_pages(bytes)?;
        if texts.iter().all(|t| t.trim().is_empty()) {
            // zero pages, or only image pages without a text layer
            return Err(PageIndexError::EmptyDocument(name));
        }
        debug!(document = %name, pages = texts.len(), "extracted pdf pages");
        Self::from_page_texts(name, texts, tokenizer)
    }

    /// Cut plain text into synthetic pages.
    pub fn from_text(
        name: impl Into<String>,
        content: &str,
        config: &IndexConfig,
        tokenizer: &dyn Tokenizer,
    ) -> Result<Self> {
        let name = name.into();
        if content.trim().is_empty() {
            return Err(PageIndexError::EmptyDocument(name));
        }
        let pages = segment_text(content, config, tokenizer);
        debug!(document = %name, pages = pages.len(), "segmented text");
        Self::new(name, pages)
    }

    /// Get total number of pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Physical index of the last page.
    pub fn last_page(&self) -> usize {
        self.pages.len().saturating_sub(1)
    }

    /// Get total token count across all pages.
    pub fn total_tokens(&self) -> usize {
        self.pages.iter().map(|p| p.token_count).sum()
    }

    /// Get a specific page by physical index.
    pub fn get_page(&self, physical_index: usize) -> Option<&PageUnit> {
        self.pages.get(physical_index)
    }

    /// Pages in `[start, end]`, clipped to the document.
    pub fn page_range(&self, start: usize, end: usize) -> &[PageUnit] {
        if start > end || start >= self.pages.len() {
            return &[];
        }
        let end = end.min(self.last_page());
        &self.pages[start..=end]
    }

    /// Summed token count of the pages in `[start, end]`.
    pub fn tokens_in_range(&self, start: usize, end: usize) -> usize {
        self.page_range(start, end)
            .iter()
            .map(|p| p.token_count)
            .sum()
    }

    /// Get all page content concatenated with index tags.
    pub fn content_with_tags(&self) -> String {
        self.content_range(0, self.last_page())
    }

    /// Get content for a range of pages (inclusive) with index tags.
    pub fn content_range(&self, start: usize, end: usize) -> String {
        self.page_range(start, end)
            .iter()
            .map(|p| p.with_index_tags())
            .collect::<Vec<_>>()
            .join("")
    }

    /// Text of the pages in `[start, end]` without the repeated overlap prefixes.
    pub fn text_range(&self, start: usize, end: usize) -> String {
        self.page_range(start, end)
            .iter()
            .map(|p| p.fresh_text())
            .collect()
    }

    /// The source text, rebuilt from the pages.
    pub fn reconstruct_text(&self) -> String {
        self.text_range(0, self.last_page())
    }
}
