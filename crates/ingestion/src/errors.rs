//! Ingestion error types
//!
//! These failures are recovered inside the pipeline (sentinel text, empty
//! entity list) and never reach HTTP callers directly.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("PDF parse error: {0}")]
    PdfParse(String),

    #[error("Entity API returned {status}: {body}")]
    EntityApi { status: u16, body: String },

    #[error("Entity API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed entity API response: {0}")]
    MalformedResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
