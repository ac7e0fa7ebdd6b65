//! Text extraction — turns an uploaded PDF, Word document or text file (or pasted
//! text) into a single UTF-8 string for the model prompt.
//!
//! PDF and Word parsing are delegated to `pdf-extract` and `docx-rs`.
//! No OCR and no layout or table reconstruction.

pub mod docx;
pub mod pdf;
pub mod text;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const MAX_EXTENSION_LEN: usize = 8;

/// File extensions accepted by the upload control.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt"];

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Word error: {0}")]
    Docx(String),

    #[error("Document contains no extractable text")]
    Empty,

    #[error("Extraction worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
    Pasted,
}

impl DocumentFormat {
    /// Resolves the format of an upload. A file extension, when present, decides;
    /// the MIME type is only consulted otherwise. Only a short alphanumeric
    /// suffix counts as an extension, so `Invoice No. 123` has none.
    pub fn detect(
        file_name: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<Self, ExtractionError> {
        let extension = file_name
            .and_then(|name| std::path::Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| looks_like_extension(ext))
            .map(|ext| ext.to_ascii_lowercase());

        if let Some(ext) = extension {
            return match ext.as_str() {
                "pdf" => Ok(DocumentFormat::Pdf),
                "docx" => Ok(DocumentFormat::Docx),
                "txt" => Ok(DocumentFormat::PlainText),
                _ => Err(ExtractionError::UnsupportedFormat(format!(".{ext}"))),
            };
        }

        let mime = content_type
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
            .unwrap_or_default();
        match mime.as_str() {
            "application/pdf" => Ok(DocumentFormat::Pdf),
            DOCX_MIME => Ok(DocumentFormat::Docx),
            "text/plain" => Ok(DocumentFormat::PlainText),
            "" => Err(ExtractionError::UnsupportedFormat(
                "file has neither an extension nor a content type".to_string(),
            )),
            other => Err(ExtractionError::UnsupportedFormat(other.to_string())),
        }
    }
}

fn looks_like_extension(ext: &str) -> bool {
    (1..=MAX_EXTENSION_LEN).contains(&ext.len()) && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// The text of the current input, plus where it came from.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub format: DocumentFormat,
    pub source_name: Option<String>,
}

/// Synchronous extraction of an already-identified format.
pub fn extract_text(format: DocumentFormat, bytes: &[u8]) -> Result<String, ExtractionError> {
    match format {
        DocumentFormat::Pdf => pdf::extract(bytes),
        DocumentFormat::Docx => docx::extract(bytes),
        DocumentFormat::PlainText | DocumentFormat::Pasted => Ok(text::decode(bytes)),
    }
}

/// Detects the upload's format and extracts its text. Binary formats are parsed
/// on the blocking pool.
pub async fn extract_upload(
    file_name: Option<&str>,
    content_type: Option<&str>,
    bytes: Bytes,
) -> Result<ExtractedDocument, ExtractionError> {
    let format = DocumentFormat::detect(file_name, content_type)?;
    debug!(?format, size = bytes.len(), "extracting uploaded document");

    let text = match format {
        DocumentFormat::PlainText | DocumentFormat::Pasted => text::decode(&bytes),
        DocumentFormat::Pdf | DocumentFormat::Docx => {
            tokio::task::spawn_blocking(move || extract_text(format, &bytes))
                .await
                .map_err(|e| ExtractionError::Worker(e.to_string()))??
        }
    };

    let text = ensure_text(text)?;
    debug!(?format, characters = text.chars().count(), "extraction complete");

    Ok(ExtractedDocument {
        text,
        format,
        source_name: file_name.map(String::from),
    })
}

/// Wraps pasted text. Passes through unchanged apart from the emptiness check.
pub fn extract_pasted(text: String) -> Result<ExtractedDocument, ExtractionError> {
    Ok(ExtractedDocument {
        text: ensure_text(text)?,
        format: DocumentFormat::Pasted,
        source_name: None,
    })
}

fn ensure_text(text: String) -> Result<String, ExtractionError> {
    if text.trim().is_empty() {
        Err(ExtractionError::Empty)
    } else {
        Ok(text)
    }
}
