//! Document management handlers

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::AppState;
use deepsearch_common::{
    auth::AuthUser,
    db::models::{Document, NamedEntity},
    errors::{AppError, Result},
};
use deepsearch_ingestion::{DocumentSummary, IngestionPipeline, UploadedFile};

/// Full document view returned by list and get
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: Uuid,
    pub title: String,
    pub storage_url: String,
    pub storage_id: String,
    pub raw_text: Option<String>,
    pub cleaned_text: Option<String>,
    pub entities: Vec<NamedEntity>,
    pub owner: Uuid,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
    pub updated_at: chrono::DateTime<chrono::FixedOffset>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            storage_url: doc.storage_url,
            storage_id: doc.storage_id,
            raw_text: doc.raw_text,
            cleaned_text: doc.cleaned_text,
            entities: doc.entities.0,
            owner: doc.owner_id,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub document: DocumentSummary,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

fn parse_document_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation {
        message: "Invalid document ID".to_string(),
        field: Some("id".to_string()),
    })
}

fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { limit }
    } else {
        AppError::InvalidFormat { message: err.body_text() }
    }
}

/// `inline; filename="<title>"` with characters a header cannot carry replaced
fn content_disposition(title: &str) -> HeaderValue {
    let safe: String = title
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' || c == ' ' { c } else { '_' })
        .collect();

    HeaderValue::from_str(&format!("inline; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("inline"))
}

/// Pull the PDF part out of the multipart body.
///
/// Content type is checked before any of the file is read, and reading stops
/// as soon as the size ceiling is crossed.
async fn read_pdf_field(
    multipart: &mut Multipart,
    field_name: &str,
    max_bytes: usize,
) -> Result<UploadedFile> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        IngestionPipeline::validate_content_type(content_type.as_deref())?;

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "document.pdf".to_string());

        let mut buf = bytes::BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, max_bytes))? {
            if buf.len() + chunk.len() > max_bytes {
                return Err(AppError::PayloadTooLarge { limit: max_bytes });
            }
            buf.extend_from_slice(&chunk);
        }

        return Ok(UploadedFile {
            filename,
            content_type,
            bytes: buf.freeze(),
        });
    }

    Err(AppError::Validation {
        message: "No file was uploaded".to_string(),
        field: Some(field_name.to_string()),
    })
}

/// Upload a PDF, extract its text and entities, and store the record
pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let mut multipart = multipart.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    let file = read_pdf_field(
        &mut multipart,
        &state.config.upload.field_name,
        state.pipeline.settings().max_file_bytes,
    )
    .await?;

    tracing::info!(
        user_id = %user.id,
        filename = %file.filename,
        size = file.bytes.len(),
        "Received document upload"
    );

    // The pipeline runs to completion even if this request future is dropped
    let pipeline = state.pipeline.clone();
    let owner = user.id;
    let summary = tokio::spawn(async move { pipeline.ingest(owner, file).await }.in_current_span())
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Ingestion task failed: {}", e),
        })??;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Document uploaded and processed successfully.".to_string(),
            document: summary,
        }),
    ))
}

/// List the caller's documents, newest first
pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<DocumentResponse>>> {
    let documents = state.pipeline.list(user.id).await?;

    Ok(Json(documents.into_iter().map(DocumentResponse::from).collect()))
}

/// Get a single document the caller owns
pub async fn get_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>> {
    let id = parse_document_id(&id)?;
    let document = state.pipeline.get_owned(user.id, id).await?;

    Ok(Json(document.into()))
}

/// Stream the stored PDF back to its owner
pub async fn download_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_document_id(&id)?;
    let (document, bytes) = state.pipeline.download(user.id, id).await?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
        (header::CONTENT_DISPOSITION, content_disposition(&document.title)),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
    ];

    Ok((headers, bytes).into_response())
}

/// Delete a document and its stored binary
pub async fn delete_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let id = parse_document_id(&id)?;
    state.pipeline.delete(user.id, id).await?;

    Ok(Json(DeleteResponse {
        message: "Document deleted successfully!".to_string(),
    }))
}
