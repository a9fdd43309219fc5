//! Document text extraction for uploaded `.txt` and `.pdf` files.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ExtractionError;

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Pdf,
}

impl DocumentFormat {
    /// Format from a file name's extension (case-insensitive). Only `.txt`
    /// and `.pdf` are accepted.
    pub fn from_filename(name: &str) -> Result<Self, ExtractionError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| ExtractionError::UnsupportedFormat(name.to_string()))?;
        match ext.as_str() {
            "txt" => Ok(Self::Text),
            "pdf" => Ok(Self::Pdf),
            _ => Err(ExtractionError::UnsupportedFormat(name.to_string())),
        }
    }
}

/// Pulls plain text out of a document.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extract text from in-memory file contents.
    async fn extract_bytes(&self, filename: &str, bytes: Vec<u8>) -> Result<String, ExtractionError>;

    /// Extract text from a file on disk.
    async fn extract_file(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        self.extract_bytes(name, bytes).await
    }
}

/// Extractor for UTF-8 text and PDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExtractor;

#[async_trait]
impl DocumentExtractor for FileExtractor {
    async fn extract_bytes(&self, filename: &str, bytes: Vec<u8>) -> Result<String, ExtractionError> {
        let format = DocumentFormat::from_filename(filename)?;
        debug!(filename = %secure_filename(filename), ?format, size = bytes.len(), "Extracting document");
        match format {
            DocumentFormat::Text => Ok(String::from_utf8(bytes)?),
            DocumentFormat::Pdf => {
                // PDF parsing is CPU-bound.
                let text = tokio::task::spawn_blocking(move || {
                    pdf_extract::extract_text_from_mem(&bytes)
                        .map_err(|e| ExtractionError::Pdf(e.to_string()))
                })
                .await
                .map_err(|e| ExtractionError::Pdf(e.to_string()))??;
                Ok(text.trim().to_string())
            }
        }
    }
}

/// Reduce a client-supplied file name to a safe ASCII name for logs.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_matches(['.', '_']).to_string()
}
