//! PDF text extraction.

use crate::error::{PageIndexError, Result};
use tracing::warn;

/// Turns PDF bytes into the text of each physical page, in page order.
pub trait PdfTextExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>>;
}

/// Extractor built on `lopdf` content-stream decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfExtractor;

impl PdfTextExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let doc = lopdf::Document::load_mem(bytes)?;

        if doc.is_encrypted() {
            return Err(PageIndexError::UnsupportedFormat(
                "encrypted PDF".to_string(),
            ));
        }

        let pages = doc.get_pages();
        let mut texts = Vec::with_capacity(pages.len());
        for page_number in pages.keys() {
            // A page without a decodable text layer still occupies its physical slot.
            let text = doc.extract_text(&[*page_number]).unwrap_or_else(|e| {
                warn!(page = page_number, error = %e, "no extractable text on page");
                String::new()
            });
            texts.push(text);
        }

        Ok(texts)
    }
}
