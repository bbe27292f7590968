//! Whitespace normalization for extracted text

/// Collapse every whitespace run into a single space and trim both ends.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
