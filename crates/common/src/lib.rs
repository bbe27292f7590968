//! DeepSearch Common Library
//!
//! Shared code for the DeepSearch services including:
//! - Database models and repository traits
//! - Object storage abstraction
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod storage;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::{DocumentRepository, Repository, UserRepository};
pub use storage::ObjectStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default model used for entity extraction
pub const DEFAULT_EXTRACTION_MODEL: &str = "gemini-2.0-flash";

/// Default upload ceiling (10 MiB)
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
