//! Object storage for uploaded PDFs
//!
//! The binary lives outside the database; records keep the returned
//! public URL and the provider id needed to fetch or delete it later.

mod memory;
mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Location of an uploaded object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Public address of the object
    pub url: String,
    /// Provider-assigned id, used for fetch and delete
    pub provider_id: String,
}

/// Outcome of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Deleted,
    NotFound,
}

/// Trait for blob storage backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`
    async fn upload(&self, bytes: Bytes, key: &str, content_type: &str) -> Result<StoredObject>;

    /// Read an object back by provider id
    async fn fetch(&self, provider_id: &str) -> Result<Bytes>;

    async fn delete(&self, provider_id: &str) -> Result<DeleteStatus>;

    /// Provider name for logs and metrics
    fn provider(&self) -> &'static str;
}

/// Build the configured storage backend
pub async fn create_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.provider.as_str() {
        "s3" => Ok(Arc::new(S3ObjectStore::from_config(config).await)),
        "memory" => {
            tracing::warn!("Using in-memory object storage; uploads are lost on restart");
            Ok(Arc::new(MemoryObjectStore::new()))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown storage provider: {}", other),
        }),
    }
}
