use super::{DeleteStatus, ObjectStore, StoredObject};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local object store
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Bytes>>,
    uploads: std::sync::atomic::AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upload calls made so far
    pub fn upload_count(&self) -> usize {
        self.uploads.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Number of objects currently held
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, bytes: Bytes, key: &str, _content_type: &str) -> Result<StoredObject> {
        self.uploads.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.objects.write().await.insert(key.to_string(), bytes);

        Ok(StoredObject {
            url: format!("memory://{}", key),
            provider_id: key.to_string(),
        })
    }

    async fn fetch(&self, provider_id: &str) -> Result<Bytes> {
        self.objects
            .read()
            .await
            .get(provider_id)
            .cloned()
            .ok_or_else(|| AppError::Storage {
                message: format!("object {} not found", provider_id),
            })
    }

    async fn delete(&self, provider_id: &str) -> Result<DeleteStatus> {
        match self.objects.write().await.remove(provider_id) {
            Some(_) => Ok(DeleteStatus::Deleted),
            None => Ok(DeleteStatus::NotFound),
        }
    }

    fn provider(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_fetch_delete() {
        let store = MemoryObjectStore::new();
        let stored = store
            .upload(Bytes::from_static(b"%PDF-1.5"), "pdfs/a.pdf", "application/pdf")
            .await
            .unwrap();

        assert_eq!(stored.provider_id, "pdfs/a.pdf");
        assert_eq!(store.upload_count(), 1);
        assert_eq!(store.fetch("pdfs/a.pdf").await.unwrap(), Bytes::from_static(b"%PDF-1.5"));

        assert_eq!(store.delete("pdfs/a.pdf").await.unwrap(), DeleteStatus::Deleted);
        assert_eq!(store.delete("pdfs/a.pdf").await.unwrap(), DeleteStatus::NotFound);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_storage_error() {
        let store = MemoryObjectStore::new();
        let err = store.fetch("nope").await.unwrap_err();
        assert!(matches!(err, AppError::Storage { .. }));
    }
}
