//! DeepSearch Ingestion
//!
//! Turns an uploaded PDF into a stored, annotated document:
//! 1. Validates type and size
//! 2. Uploads the binary to object storage
//! 3. Extracts and normalizes the text
//! 4. Annotates it with named entities
//! 5. Persists the document record

pub mod entities;
pub mod errors;
pub mod normalize;
pub mod pdf;
pub mod pipeline;

pub use entities::{create_extractor, EntityExtractor, GeminiExtractor};
pub use errors::IngestionError;
pub use normalize::normalize;
pub use pipeline::{DocumentSummary, IngestionPipeline, PipelineSettings, UploadedFile};
