// Document loading: one Document per PDF file in a directory

#[cfg(test)]
mod tests;

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{RagError, Result};

/// Text of one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: PathBuf,
    pub text: String,
}

/// Turns a file into plain text
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Extracts text from PDF files with `pdf-extract`
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    #[inline]
    fn extract(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|e| {
            RagError::Ingestion(format!("Failed to read {}: {}", path.display(), e))
        })?;

        // pdf-extract panics on some malformed files instead of returning an error
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(&bytes)
        }))
        .map_err(|_| {
            RagError::Ingestion(format!("PDF parser crashed on {}", path.display()))
        })?;

        extracted.map_err(|e| {
            RagError::Ingestion(format!(
                "Failed to extract text from {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Load every readable PDF in `dir`, sorted by path.
///
/// Files that fail to extract or contain no text are skipped with a warning.
/// Fails when the directory is missing or yields no readable PDF at all.
#[inline]
pub fn load_documents(dir: &Path, extractor: &dyn TextExtractor) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(RagError::Ingestion(format!(
            "Document directory {} does not exist",
            dir.display()
        )));
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| {
        RagError::Ingestion(format!("Failed to list {}: {}", dir.display(), e))
    })? {
        let path = entry
            .map_err(|e| RagError::Ingestion(format!("Failed to list {}: {}", dir.display(), e)))?
            .path();
        if path.is_file() && is_pdf(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    debug!("Found {} PDF files in {}", paths.len(), dir.display());

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match extractor.extract(&path) {
            Ok(text) if text.trim().is_empty() => {
                warn!("Skipping {}: no extractable text", path.display());
            }
            Ok(text) => {
                debug!(
                    "Loaded {} ({} characters)",
                    path.display(),
                    text.chars().count()
                );
                documents.push(Document { source: path, text });
            }
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    if documents.is_empty() {
        return Err(RagError::Ingestion(format!(
            "No readable PDF files found in {}",
            dir.display()
        )));
    }

    info!("Loaded {} documents from {}", documents.len(), dir.display());
    Ok(documents)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
