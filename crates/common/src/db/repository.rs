//! Repository pattern for database operations
//!
//! Handlers and the ingestion pipeline talk to the traits defined here;
//! `Repository` is the Postgres implementation and
//! [`MemoryRepository`](super::MemoryRepository) backs local runs and tests.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use uuid::Uuid;

/// Fields needed to create a document record
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub storage_url: String,
    pub storage_id: String,
    pub raw_text: String,
    pub cleaned_text: String,
    pub entities: EntityList,
    pub owner_id: Uuid,
}

/// Fields needed to create a user account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Persistence of document records
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a record, assigning id and timestamps
    async fn create_document(&self, doc: NewDocument) -> Result<Document>;

    async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>>;

    /// All documents of one owner, newest first
    async fn list_documents_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>>;

    /// Remove a record; `false` when it did not exist
    async fn delete_document(&self, id: Uuid) -> Result<bool>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<()>;
}

/// Persistence of user accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; a taken email yields `AppError::Duplicate`
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
}

/// Postgres-backed repository
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[async_trait]
impl DocumentRepository for Repository {
    async fn create_document(&self, doc: NewDocument) -> Result<Document> {
        let now = chrono::Utc::now();

        let model = DocumentActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(doc.title),
            storage_url: Set(doc.storage_url),
            storage_id: Set(doc.storage_id),
            raw_text: Set(Some(doc.raw_text)),
            cleaned_text: Set(Some(doc.cleaned_text)),
            entities: Set(doc.entities),
            owner_id: Set(doc.owner_id),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        model
            .insert(self.write_conn())
            .await
            .map_err(|e| AppError::Persistence { message: e.to_string() })
    }

    async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_documents_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::OwnerId.eq(owner_id))
            .order_by_desc(DocumentColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        let result = DocumentEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

#[async_trait]
impl UserRepository for Repository {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let now = chrono::Utc::now();

        let model = UserActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(user.name),
            email: Set(user.email),
            password_hash: Set(user.password_hash),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        model.insert(self.write_conn()).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Duplicate { message: "User with this email already exists".to_string() }
            } else {
                e.into()
            }
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }
}
