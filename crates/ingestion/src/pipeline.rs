//! Document ingestion pipeline
//!
//! Core logic for one upload: validate, store, extract text, normalize,
//! annotate and persist. Also owns the ownership-checked read and delete paths.

use crate::entities::EntityExtractor;
use crate::normalize::normalize;
use crate::pdf::extract_text_blocking;
use bytes::Bytes;
use deepsearch_common::config::AppConfig;
use deepsearch_common::db::models::{Document, EntityList, NamedEntity};
use deepsearch_common::db::{DocumentRepository, NewDocument};
use deepsearch_common::errors::{AppError, Result};
use deepsearch_common::metrics;
use deepsearch_common::storage::{DeleteStatus, ObjectStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Stored in place of the raw text when the PDF cannot be read
pub const EXTRACTION_FAILED: &str = "[EXTRACTION FAILED]";

/// Content type prefix accepted for uploads
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Tunables for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Object store key prefix
    pub folder: String,
    pub max_file_bytes: usize,
    pub preview_chars: usize,
    /// Delete the stored binary when the record cannot be saved
    pub cleanup_orphaned_blobs: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            folder: config.storage.folder.clone(),
            max_file_bytes: config.upload.max_file_bytes,
            preview_chars: config.upload.preview_chars,
            cleanup_orphaned_blobs: config.upload.cleanup_orphaned_blobs,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// A file received from a client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original filename
    pub filename: String,
    /// Declared content type
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Upload response view of a document; never carries the full text
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub storage_url: String,
    pub raw_text_preview: String,
    pub cleaned_text_preview: String,
    pub entities_count: usize,
    pub owner: Uuid,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
    pub updated_at: chrono::DateTime<chrono::FixedOffset>,
}

impl DocumentSummary {
    pub fn from_document(doc: &Document, preview_chars: usize) -> Self {
        let raw = doc.raw_text.as_deref().unwrap_or_default();
        let cleaned = doc.cleaned_text.as_deref().unwrap_or_default();

        Self {
            id: doc.id,
            title: doc.title.clone(),
            storage_url: doc.storage_url.clone(),
            raw_text_preview: preview(raw, preview_chars),
            cleaned_text_preview: if cleaned.is_empty() {
                "N/A".to_string()
            } else {
                preview(cleaned, preview_chars)
            },
            entities_count: doc.entities.len(),
            owner: doc.owner_id,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

/// First `max_chars` characters, with `...` appended when cut
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Replace everything but ASCII alphanumerics and `-` with `_`
fn sanitize(stem: &str) -> String {
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Object store key: `<folder>/pdf-<unix-millis>-<nonce>-<sanitized stem>.pdf`
///
/// The stem is the filename up to its first `.`. The nonce keeps keys unique
/// when the same filename arrives within one millisecond.
pub fn storage_key(folder: &str, filename: &str, unix_millis: i64, nonce: Uuid) -> String {
    let stem = filename.split('.').next().unwrap_or_default();
    let name = format!("pdf-{}-{}-{}.pdf", unix_millis, nonce.simple(), sanitize(stem));

    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name
    } else {
        format!("{}/{}", folder, name)
    }
}

/// Orchestrates uploads and owner-scoped document access
pub struct IngestionPipeline {
    documents: Arc<dyn DocumentRepository>,
    store: Arc<dyn ObjectStore>,
    extractor: Arc<dyn EntityExtractor>,
    settings: PipelineSettings,
}

impl IngestionPipeline {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        store: Arc<dyn ObjectStore>,
        extractor: Arc<dyn EntityExtractor>,
        settings: PipelineSettings,
    ) -> Self {
        Self { documents, store, extractor, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Reject anything not declared as a PDF
    pub fn validate_content_type(content_type: Option<&str>) -> Result<()> {
        match content_type {
            Some(ct) if ct.trim().to_ascii_lowercase().starts_with(PDF_CONTENT_TYPE) => Ok(()),
            other => Err(AppError::UnsupportedFileType {
                content_type: other.unwrap_or("unknown").to_string(),
            }),
        }
    }

    /// Reject payloads over the configured ceiling
    pub fn check_size(&self, len: usize) -> Result<()> {
        if len > self.settings.max_file_bytes {
            return Err(AppError::PayloadTooLarge { limit: self.settings.max_file_bytes });
        }
        Ok(())
    }

    /// Run the full upload pipeline for `owner`
    #[instrument(
        skip(self, file),
        fields(owner = %owner, filename = %file.filename, size = file.bytes.len())
    )]
    pub async fn ingest(&self, owner: Uuid, file: UploadedFile) -> Result<DocumentSummary> {
        let start = Instant::now();
        let size = file.bytes.len();

        // Validate
        if file.bytes.is_empty() {
            return Err(AppError::Validation {
                message: "No file was uploaded".to_string(),
                field: Some("pdf".to_string()),
            });
        }
        Self::validate_content_type(file.content_type.as_deref())?;
        self.check_size(file.bytes.len())?;

        // Store
        let key = storage_key(
            &self.settings.folder,
            &file.filename,
            chrono::Utc::now().timestamp_millis(),
            Uuid::new_v4(),
        );
        let stored = self
            .store
            .upload(file.bytes.clone(), &key, PDF_CONTENT_TYPE)
            .await
            .inspect_err(|e| {
                metrics::record_storage_op(self.store.provider(), "upload", false);
                error!(error = %e, key = %key, "Object storage upload failed");
            })?;
        metrics::record_storage_op(self.store.provider(), "upload", true);
        info!(key = %key, url = %stored.url, "PDF stored");

        // Extract raw text
        let raw_text = self.extract_raw_text(file.bytes).await;

        // Normalize
        let cleaned_text = if raw_text == EXTRACTION_FAILED {
            String::new()
        } else {
            normalize(&raw_text)
        };

        // Annotate
        let entities = if cleaned_text.is_empty() {
            debug!("Skipping entity extraction: no cleaned text");
            Vec::new()
        } else {
            self.annotate(&cleaned_text).await
        };
        let entity_count = entities.len();

        // Persist
        let new_doc = NewDocument {
            title: file.filename,
            storage_url: stored.url,
            storage_id: stored.provider_id.clone(),
            raw_text,
            cleaned_text,
            entities: EntityList(entities),
            owner_id: owner,
        };

        let document = match self.documents.create_document(new_doc).await {
            Ok(doc) => doc,
            Err(e) => {
                error!(error = %e, "Failed to persist document record");
                self.discard_orphan(&stored.provider_id).await;
                return Err(match e {
                    AppError::Persistence { .. } => e,
                    other => AppError::Persistence { message: other.to_string() },
                });
            }
        };

        let duration = start.elapsed().as_secs_f64();
        metrics::record_upload(duration, size, entity_count);

        info!(
            document_id = %document.id,
            entities = entity_count,
            duration_ms = (duration * 1000.0) as u64,
            "Document ingested"
        );

        Ok(DocumentSummary::from_document(&document, self.settings.preview_chars))
    }

    /// Best-effort text extraction; failures become the sentinel
    #[instrument(skip_all)]
    async fn extract_raw_text(&self, bytes: Bytes) -> String {
        match extract_text_blocking(bytes).await {
            Ok(text) => {
                debug!(chars = text.chars().count(), "Raw text extracted");
                text
            }
            Err(e) => {
                warn!(error = %e, "PDF text extraction failed");
                metrics::record_pdf_extraction_failure();
                EXTRACTION_FAILED.to_string()
            }
        }
    }

    /// Entity extraction; failures yield an empty list
    #[instrument(skip_all, fields(model = %self.extractor.model_name()))]
    async fn annotate(&self, cleaned_text: &str) -> Vec<NamedEntity> {
        let start = Instant::now();
        let model = self.extractor.model_name().to_string();

        match self.extractor.extract(cleaned_text).await {
            Ok(entities) => {
                metrics::record_entity_extraction(start.elapsed().as_secs_f64(), &model, "success");
                entities
            }
            Err(e) => {
                metrics::record_entity_extraction(start.elapsed().as_secs_f64(), &model, "error");
                warn!(error = %e, "Entity extraction failed, continuing without entities");
                Vec::new()
            }
        }
    }

    async fn discard_orphan(&self, provider_id: &str) {
        if !self.settings.cleanup_orphaned_blobs {
            warn!(provider_id, "Stored binary left without a document record");
            return;
        }

        match self.store.delete(provider_id).await {
            Ok(_) => {
                metrics::record_storage_op(self.store.provider(), "delete", true);
                info!(provider_id, "Removed orphaned binary");
            }
            Err(e) => {
                metrics::record_storage_op(self.store.provider(), "delete", false);
                warn!(provider_id, error = %e, "Failed to remove orphaned binary");
            }
        }
    }

    /// Fetch a document the caller owns
    #[instrument(skip(self))]
    pub async fn get_owned(&self, user_id: Uuid, id: Uuid) -> Result<Document> {
        let document = self
            .documents
            .find_document_by_id(id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;

        if !document.is_owned_by(user_id) {
            warn!(document_id = %id, user_id = %user_id, "Document access denied");
            return Err(AppError::NotDocumentOwner { id: id.to_string() });
        }

        Ok(document)
    }

    /// All of the caller's documents, newest first
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Document>> {
        self.documents.list_documents_by_owner(user_id).await
    }

    /// Document record plus its stored binary
    #[instrument(skip(self))]
    pub async fn download(&self, user_id: Uuid, id: Uuid) -> Result<(Document, Bytes)> {
        let document = self.get_owned(user_id, id).await?;

        let bytes = self
            .store
            .fetch(&document.storage_id)
            .await
            .inspect_err(|e| {
                metrics::record_storage_op(self.store.provider(), "fetch", false);
                error!(error = %e, storage_id = %document.storage_id, "Failed to fetch stored PDF");
            })?;
        metrics::record_storage_op(self.store.provider(), "fetch", true);

        Ok((document, bytes))
    }

    /// Remove a document; storage cleanup never blocks record removal
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let document = self.get_owned(user_id, id).await?;

        if document.storage_id.is_empty() {
            debug!("No storage id recorded, skipping object deletion");
        } else {
            match self.store.delete(&document.storage_id).await {
                Ok(DeleteStatus::Deleted) => {
                    metrics::record_storage_op(self.store.provider(), "delete", true);
                    debug!(storage_id = %document.storage_id, "Stored PDF deleted");
                }
                Ok(DeleteStatus::NotFound) => {
                    metrics::record_storage_op(self.store.provider(), "delete", true);
                    warn!(storage_id = %document.storage_id, "Stored PDF already absent");
                }
                Err(e) => {
                    metrics::record_storage_op(self.store.provider(), "delete", false);
                    warn!(
                        storage_id = %document.storage_id,
                        error = %e,
                        "Failed to delete stored PDF, removing record anyway"
                    );
                }
            }
        }

        if !self.documents.delete_document(id).await? {
            return Err(AppError::DocumentNotFound { id: id.to_string() });
        }

        info!(document_id = %id, "Document deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::IngestionError;
    use crate::pdf::tests::build_pdf;
    use async_trait::async_trait;
    use deepsearch_common::db::models::EntityType;
    use deepsearch_common::db::{MemoryRepository, NewUser, UserRepository};
    use deepsearch_common::storage::{MemoryObjectStore, StoredObject};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedExtractor {
        result: std::result::Result<Vec<NamedEntity>, String>,
        calls: AtomicUsize,
    }

    impl FixedExtractor {
        fn ok(entities: Vec<NamedEntity>) -> Arc<Self> {
            Arc::new(Self { result: Ok(entities), calls: AtomicUsize::new(0) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { result: Err("boom".into()), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl EntityExtractor for FixedExtractor {
        async fn extract(&self, _text: &str) -> std::result::Result<Vec<NamedEntity>, IngestionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .map_err(IngestionError::MalformedResponse)
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Store whose deletes always fail
    struct BrokenDeleteStore(MemoryObjectStore);

    #[async_trait]
    impl ObjectStore for BrokenDeleteStore {
        async fn upload(&self, bytes: Bytes, key: &str, content_type: &str) -> Result<StoredObject> {
            self.0.upload(bytes, key, content_type).await
        }

        async fn fetch(&self, provider_id: &str) -> Result<Bytes> {
            self.0.fetch(provider_id).await
        }

        async fn delete(&self, _provider_id: &str) -> Result<DeleteStatus> {
            Err(AppError::Storage { message: "provider unavailable".into() })
        }

        fn provider(&self) -> &'static str {
            "broken"
        }
    }

    /// Store that rejects every upload
    struct UnreachableStore;

    #[async_trait]
    impl ObjectStore for UnreachableStore {
        async fn upload(&self, _bytes: Bytes, _key: &str, _content_type: &str) -> Result<StoredObject> {
            Err(AppError::Storage { message: "connection refused".into() })
        }

        async fn fetch(&self, provider_id: &str) -> Result<Bytes> {
            Err(AppError::Storage { message: format!("object {} not found", provider_id) })
        }

        async fn delete(&self, _provider_id: &str) -> Result<DeleteStatus> {
            Ok(DeleteStatus::NotFound)
        }

        fn provider(&self) -> &'static str {
            "unreachable"
        }
    }

    /// Repository whose inserts always fail
    struct RejectingRepository;

    #[async_trait]
    impl DocumentRepository for RejectingRepository {
        async fn create_document(&self, _doc: NewDocument) -> Result<Document> {
            Err(AppError::Persistence { message: "disk full".into() })
        }

        async fn find_document_by_id(&self, _id: Uuid) -> Result<Option<Document>> {
            Ok(None)
        }

        async fn list_documents_by_owner(&self, _owner_id: Uuid) -> Result<Vec<Document>> {
            Ok(Vec::new())
        }

        async fn delete_document(&self, _id: Uuid) -> Result<bool> {
            Ok(false)
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    fn pdf_file(name: &str, bytes: Vec<u8>) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: Bytes::from(bytes),
        }
    }

    async fn owner(repo: &MemoryRepository, email: &str) -> Uuid {
        repo.create_user(NewUser {
            name: "Test".into(),
            email: email.into(),
            password_hash: "hash".into(),
        })
        .await
        .unwrap()
        .id
    }

    #[test]
    fn test_storage_key_sanitizes_stem() {
        let nonce = Uuid::nil();
        assert_eq!(
            storage_key("deepsearch_pdfs", "Q3 report (final).v2.pdf", 1700000000000, nonce),
            "deepsearch_pdfs/pdf-1700000000000-00000000000000000000000000000000-Q3_report__final_.pdf"
        );
        assert_eq!(
            storage_key("", "a-b.pdf", 1, nonce),
            "pdf-1-00000000000000000000000000000000-a-b.pdf"
        );
        assert_eq!(
            storage_key("/docs/", "ümlaut.pdf", 5, nonce),
            "docs/pdf-5-00000000000000000000000000000000-_mlaut.pdf"
        );
    }

    #[test]
    fn test_storage_key_unique_within_a_millisecond() {
        let a = storage_key("deepsearch_pdfs", "report.pdf", 42, Uuid::new_v4());
        let b = storage_key("deepsearch_pdfs", "report.pdf", 42, Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[test]
    fn test_preview_truncation() {
        assert_eq!(preview("short", 100), "short");
        let long = "x".repeat(150);
        let p = preview(&long, 100);
        assert_eq!(p.len(), 103);
        assert!(p.ends_with("..."));
        assert_eq!(preview(&"y".repeat(100), 100), "y".repeat(100));
    }

    #[test]
    fn test_content_type_validation() {
        assert!(IngestionPipeline::validate_content_type(Some("application/pdf")).is_ok());
        assert!(IngestionPipeline::validate_content_type(Some("application/pdf; charset=binary")).is_ok());
        assert!(matches!(
            IngestionPipeline::validate_content_type(Some("image/png")),
            Err(AppError::UnsupportedFileType { .. })
        ));
        assert!(IngestionPipeline::validate_content_type(None).is_err());
    }

    #[tokio::test]
    async fn test_ingest_two_page_pdf() {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryObjectStore::new());
        let extractor = FixedExtractor::ok(vec![
            NamedEntity::new("Acme Corp", EntityType::Org),
            NamedEntity::new("Berlin", EntityType::Location),
        ]);
        let pipeline = IngestionPipeline::new(repo.clone(), store.clone(), extractor.clone(), PipelineSettings::default());
        let user = owner(&repo, "a@example.com").await;

        let bytes = build_pdf(&["Quarterly   report for Acme Corp", "Prepared in Berlin"]);
        let summary = pipeline.ingest(user, pdf_file("report.pdf", bytes)).await.unwrap();

        assert_eq!(summary.title, "report.pdf");
        assert_eq!(summary.owner, user);
        assert_eq!(summary.entities_count, 2);
        assert!(summary.cleaned_text_preview.contains("Quarterly report for Acme Corp"));
        assert_eq!(store.upload_count(), 1);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);

        let stored = repo.find_document_by_id(summary.id).await.unwrap().unwrap();
        assert!(stored.storage_id.starts_with("deepsearch_pdfs/pdf-"));
        assert!(stored.storage_id.ends_with("-report.pdf"));
        let cleaned = stored.cleaned_text.unwrap();
        assert!(!cleaned.contains("  "));
    }

    #[tokio::test]
    async fn test_non_pdf_never_reaches_storage() {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = IngestionPipeline::new(repo.clone(), store.clone(), FixedExtractor::ok(vec![]), PipelineSettings::default());

        let file = UploadedFile {
            filename: "notes.txt".into(),
            content_type: Some("text/plain".into()),
            bytes: Bytes::from_static(b"hello"),
        };
        let err = pipeline.ingest(Uuid::new_v4(), file).await.unwrap_err();

        assert!(matches!(err, AppError::UnsupportedFileType { .. }));
        assert_eq!(store.upload_count(), 0);
        assert_eq!(repo.document_count().await, 0);
    }

    #[tokio::test]
    async fn test_oversize_rejected_before_storage() {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryObjectStore::new());
        let settings = PipelineSettings { max_file_bytes: 8, ..Default::default() };
        let pipeline = IngestionPipeline::new(repo, store.clone(), FixedExtractor::ok(vec![]), settings);

        let err = pipeline
            .ingest(Uuid::new_v4(), pdf_file("big.pdf", vec![b'x'; 9]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PayloadTooLarge { limit: 8 }));
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_pdf_uses_sentinel() {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryObjectStore::new());
        let extractor = FixedExtractor::ok(vec![NamedEntity::new("Nobody", EntityType::Person)]);
        let pipeline = IngestionPipeline::new(repo.clone(), store.clone(), extractor.clone(), PipelineSettings::default());

        let summary = pipeline
            .ingest(Uuid::new_v4(), pdf_file("broken.pdf", b"definitely not a pdf".to_vec()))
            .await
            .unwrap();

        assert_eq!(summary.raw_text_preview, EXTRACTION_FAILED);
        assert_eq!(summary.cleaned_text_preview, "N/A");
        assert_eq!(summary.entities_count, 0);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);

        let stored = repo.find_document_by_id(summary.id).await.unwrap().unwrap();
        assert_eq!(stored.raw_text.as_deref(), Some(EXTRACTION_FAILED));
        assert!(stored.entities.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_extractor_failure_yields_empty_entities() {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = IngestionPipeline::new(repo.clone(), store, FixedExtractor::failing(), PipelineSettings::default());

        let summary = pipeline
            .ingest(Uuid::new_v4(), pdf_file("memo.pdf", build_pdf(&["Memo to Ada Lovelace"])))
            .await
            .unwrap();

        assert_eq!(summary.entities_count, 0);
        assert_ne!(summary.cleaned_text_preview, "N/A");
    }

    #[tokio::test]
    async fn test_persist_failure_removes_orphan() {
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = IngestionPipeline::new(
            Arc::new(RejectingRepository),
            store.clone(),
            FixedExtractor::ok(vec![]),
            PipelineSettings::default(),
        );

        let err = pipeline
            .ingest(Uuid::new_v4(), pdf_file("a.pdf", build_pdf(&["text"])))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Persistence { .. }));
        assert_eq!(store.upload_count(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_ownership_enforced() {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = IngestionPipeline::new(repo.clone(), store, FixedExtractor::ok(vec![]), PipelineSettings::default());
        let alice = owner(&repo, "alice@example.com").await;
        let bob = owner(&repo, "bob@example.com").await;

        let summary = pipeline
            .ingest(alice, pdf_file("private.pdf", build_pdf(&["secret"])))
            .await
            .unwrap();

        assert!(pipeline.get_owned(alice, summary.id).await.is_ok());
        assert!(matches!(
            pipeline.get_owned(bob, summary.id).await,
            Err(AppError::NotDocumentOwner { .. })
        ));
        assert!(matches!(
            pipeline.download(bob, summary.id).await,
            Err(AppError::NotDocumentOwner { .. })
        ));
        assert!(matches!(
            pipeline.delete(bob, summary.id).await,
            Err(AppError::NotDocumentOwner { .. })
        ));
        assert!(matches!(
            pipeline.get_owned(alice, Uuid::new_v4()).await,
            Err(AppError::DocumentNotFound { .. })
        ));
        assert!(pipeline.list(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_survives_storage_failure() {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(BrokenDeleteStore(MemoryObjectStore::new()));
        let pipeline = IngestionPipeline::new(repo.clone(), store, FixedExtractor::ok(vec![]), PipelineSettings::default());
        let user = owner(&repo, "c@example.com").await;

        let summary = pipeline
            .ingest(user, pdf_file("gone.pdf", build_pdf(&["bye"])))
            .await
            .unwrap();

        pipeline.delete(user, summary.id).await.unwrap();
        assert!(repo.find_document_by_id(summary.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_download_returns_stored_bytes() {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = IngestionPipeline::new(repo.clone(), store, FixedExtractor::ok(vec![]), PipelineSettings::default());
        let user = owner(&repo, "d@example.com").await;
        let bytes = build_pdf(&["download me"]);

        let summary = pipeline
            .ingest(user, pdf_file("dl.pdf", bytes.clone()))
            .await
            .unwrap();

        let (doc, fetched) = pipeline.download(user, summary.id).await.unwrap();
        assert_eq!(doc.title, "dl.pdf");
        assert_eq!(fetched.as_ref(), bytes.as_slice());
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_before_persist() {
        let repo = Arc::new(MemoryRepository::new());
        let extractor = FixedExtractor::ok(vec![NamedEntity::new("Acme", EntityType::Org)]);
        let pipeline = IngestionPipeline::new(
            repo.clone(),
            Arc::new(UnreachableStore),
            extractor.clone(),
            PipelineSettings::default(),
        );

        let err = pipeline
            .ingest(Uuid::new_v4(), pdf_file("report.pdf", build_pdf(&["Acme annual report"])))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Storage { .. }));
        assert_eq!(repo.document_count().await, 0);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_same_name_uploads_keep_separate_blobs() {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = IngestionPipeline::new(repo.clone(), store.clone(), FixedExtractor::ok(vec![]), PipelineSettings::default());
        let alice = owner(&repo, "alice@example.com").await;
        let bob = owner(&repo, "bob@example.com").await;

        for _ in 0..10 {
            let (a, b) = tokio::join!(
                pipeline.ingest(alice, pdf_file("report.pdf", b"ALICE-SECRET".to_vec())),
                pipeline.ingest(bob, pdf_file("report.pdf", b"BOB-DATA".to_vec())),
            );
            let (a, b) = (a.unwrap(), b.unwrap());
            assert_ne!(a.storage_url, b.storage_url);

            let (_, alice_bytes) = pipeline.download(alice, a.id).await.unwrap();
            assert_eq!(alice_bytes.as_ref(), b"ALICE-SECRET");

            pipeline.delete(bob, b.id).await.unwrap();
            let (_, still_there) = pipeline.download(alice, a.id).await.unwrap();
            assert_eq!(still_there.as_ref(), b"ALICE-SECRET");

            pipeline.delete(alice, a.id).await.unwrap();
        }

        assert!(store.is_empty().await);
        assert_eq!(repo.document_count().await, 0);
    }
}
