//! Text extraction from PDF files with lopdf.
use std::path::Path;

use lopdf::Document;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read PDF: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse PDF: {0}")]
    Parse(String),

    #[error("failed to extract text from page {page}: {reason}")]
    Page { page: u32, reason: String },

    #[error("PDF contains no extractable text")]
    NoText,
}

/// Text of one page, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

/// Extracts the text of every page of the PDF at `path`, in page order.
pub fn extract_pages(path: &Path) -> Result<Vec<PageText>, ExtractError> {
    info!("Extracting text from {}", path.display());
    let bytes = std::fs::read(path)?;
    extract_pages_from_mem(&bytes)
}

/// Same as [`extract_pages`] for an in-memory PDF.
///
/// Any page whose content cannot be decoded fails the whole document with
/// [`ExtractError::Page`]; blank pages are kept as empty strings. Fails with
/// [`ExtractError::NoText`] when no page yields any text.
pub fn extract_pages_from_mem(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractError::Parse(e.to_string()))?;

    let mut pages = Vec::new();
    for page_number in doc.get_pages().into_keys() {
        let text = doc.extract_text(&[page_number]).map_err(|e| {
            warn!("Page {page_number}: text extraction failed: {e}");
            ExtractError::Page {
                page: page_number,
                reason: e.to_string(),
            }
        })?;
        debug!("Page {page_number}: {} chars", text.chars().count());
        pages.push(PageText { page_number, text });
    }

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(ExtractError::NoText);
    }
    info!("Extracted text from {} page(s)", pages.len());
    Ok(pages)
}

/// Joins page texts in order with a single newline.
#[must_use]
pub fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extracts the whole document as one string.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    extract_pages(path).map(|pages| join_pages(&pages))
}
