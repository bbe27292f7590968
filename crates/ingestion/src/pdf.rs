//! PDF text extraction module
//!
//! Extracts text content from in-memory PDF bytes using lopdf.

use crate::errors::IngestionError;
use lopdf::content::Content;
use lopdf::{Document, Object};
use tracing::{debug, warn};

/// TJ kerning offsets below this (in thousandths of an em) read as a word gap
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// Extract the text of every page, pages separated by newlines.
///
/// A document that parses but carries no text yields an empty string.
/// Pages whose content stream cannot be decoded are skipped.
pub fn extract_text(bytes: &[u8]) -> Result<String, IngestionError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| IngestionError::PdfParse(format!("Failed to load PDF: {}", e)))?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for (page_num, page_id) in pages {
        match extract_page_text(&doc, page_id) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to extract text from page, skipping");
            }
        }
    }

    debug!(chars = text.chars().count(), "Text extraction complete");
    Ok(text)
}

/// Run [`extract_text`] on the blocking pool
pub async fn extract_text_blocking(bytes: bytes::Bytes) -> Result<String, IngestionError> {
    tokio::task::spawn_blocking(move || extract_text(&bytes))
        .await
        .map_err(|e| IngestionError::PdfParse(format!("extraction task failed: {}", e)))?
}

fn extract_page_text(doc: &Document, page_id: lopdf::ObjectId) -> Result<String, lopdf::Error> {
    let data = doc.get_page_content(page_id)?;
    let content = Content::decode(&data)?;

    let mut text = String::new();
    for op in &content.operations {
        match op.operator.as_str() {
            "Tj" | "'" | "\"" => {
                if matches!(op.operator.as_str(), "'" | "\"") {
                    text.push('\n');
                }
                if let Some(Object::String(bytes, _)) = op.operands.last() {
                    text.push_str(&decode_pdf_string(bytes));
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => text.push_str(&decode_pdf_string(bytes)),
                            Object::Integer(n) if (*n as f32) < TJ_SPACE_THRESHOLD => text.push(' '),
                            Object::Real(n) if *n < TJ_SPACE_THRESHOLD => text.push(' '),
                            _ => {}
                        }
                    }
                }
            }
            "Td" | "TD" | "T*" => text.push('\n'),
            "ET" => text.push(' '),
            _ => {}
        }
    }

    Ok(text)
}

/// Decode a PDF string object: UTF-16BE when BOM-prefixed, Latin-1 otherwise
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}
