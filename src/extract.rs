//! Page text extraction.
//!
//! Scripts are read from their plain-text rendition (`pdftotext` output),
//! where pages are separated by form feeds.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::model::PageText;

pub const DEFAULT_MAX_PAGES: usize = 400;

const PAGE_BREAK: char = '\x0c';

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Could not open document {path:?}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Document {path:?} is not plain text")]
    NotText { path: PathBuf },
}

/// Read a script and return its pages in order, keeping at most `max_pages`.
/// An empty file has no pages.
pub fn text_by_page(path: &Path, max_pages: usize) -> Result<Vec<PageText>, ExtractError> {
    let raw = read_text(path)?;
    let mut pages = split_pages(&raw);

    if pages.len() > max_pages {
        warn!(
            path = %path.display(),
            pages = pages.len(),
            max_pages,
            "truncating document at page cap"
        );
        pages.truncate(max_pages);
    }

    info!(path = %path.display(), pages = pages.len(), "extracted page text");
    Ok(pages)
}

/// Total number of pages, ignoring the cap.
pub fn page_count(path: &Path) -> Result<usize, ExtractError> {
    let raw = read_text(path)?;
    Ok(split_pages(&raw).len())
}

/// Split raw text on form feeds. A trailing form feed closes the last page
/// rather than opening an empty one.
pub fn split_pages(raw: &str) -> Vec<PageText> {
    if raw.is_empty() {
        return Vec::new();
    }
    let body = raw.strip_suffix(PAGE_BREAK).unwrap_or(raw);
    body.split(PAGE_BREAK)
        .enumerate()
        .map(|(i, text)| PageText::new(i, text))
        .collect()
}

fn read_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|_| ExtractError::NotText {
        path: path.to_path_buf(),
    })
}
