//! Text extraction for uploaded documents.
//!
//! Only PDF is supported. Extraction never panics; failures come back as
//! an [`ExtractError`] and the ingestion call reports them to its caller.

use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extract plain UTF-8 text from `bytes` of the given content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => extract_pdf(bytes),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}
