// Text extraction module
// Page-by-page access to the text of uploaded PDFs

#[cfg(test)]
mod tests;

use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

use crate::{RagError, Result};

/// Paginated text of one document.
///
/// Pages are pulled one at a time so ingestion never holds more than a single
/// page of text. Extraction is CPU bound; async callers go through
/// `spawn_blocking`.
pub trait TextSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// Raw text of page `page_index` (zero based)
    fn page_text(&self, page_index: usize) -> Result<String>;
}

/// A PDF loaded with lopdf
#[derive(Debug)]
pub struct PdfText {
    document: Document,
    /// One-based page numbers in document order
    pages: Vec<u32>,
}

impl PdfText {
    #[inline]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let document = Document::load(path).map_err(|e| {
            RagError::Ingestion(format!("Failed to parse PDF {}: {}", path.display(), e))
        })?;
        debug!("Loaded PDF {}", path.display());
        Ok(Self::from_document(document))
    }

    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let document = Document::load_mem(bytes)
            .map_err(|e| RagError::Ingestion(format!("Failed to parse PDF: {e}")))?;
        Ok(Self::from_document(document))
    }

    fn from_document(document: Document) -> Self {
        let pages = document.get_pages().into_keys().collect();
        Self { document, pages }
    }
}

impl TextSource for PdfText {
    #[inline]
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page_index: usize) -> Result<String> {
        let page_number = *self.pages.get(page_index).ok_or_else(|| {
            RagError::InvalidInput(format!(
                "Page index {} out of range ({} pages)",
                page_index,
                self.pages.len()
            ))
        })?;

        match self.document.extract_text(&[page_number]) {
            Ok(text) => Ok(text),
            Err(e) => {
                // image-only or oddly encoded pages contribute no text
                warn!("Could not extract text from page {}: {}", page_number, e);
                Ok(String::new())
            }
        }
    }
}

/// In-memory pages, for plain text input and tests
#[derive(Debug, Clone, Default)]
pub struct PagedText(pub Vec<String>);

impl PagedText {
    #[inline]
    pub fn new<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(pages.into_iter().map(Into::into).collect())
    }
}

impl TextSource for PagedText {
    #[inline]
    fn page_count(&self) -> usize {
        self.0.len()
    }

    #[inline]
    fn page_text(&self, page_index: usize) -> Result<String> {
        self.0.get(page_index).cloned().ok_or_else(|| {
            RagError::InvalidInput(format!(
                "Page index {} out of range ({} pages)",
                page_index,
                self.0.len()
            ))
        })
    }
}
