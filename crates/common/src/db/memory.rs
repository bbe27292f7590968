//! In-process repository
//!
//! Used by `database.url = "memory"` setups and throughout the test suites.

use crate::db::models::{Document, User};
use crate::db::repository::{DocumentRepository, NewDocument, NewUser, UserRepository};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryRepository {
    documents: RwLock<HashMap<Uuid, Document>>,
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored document records
    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl DocumentRepository for MemoryRepository {
    async fn create_document(&self, doc: NewDocument) -> Result<Document> {
        let now = chrono::Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            title: doc.title,
            storage_url: doc.storage_url,
            storage_id: doc.storage_id,
            raw_text: Some(doc.raw_text),
            cleaned_text: Some(doc.cleaned_text),
            entities: doc.entities,
            owner_id: doc.owner_id,
            created_at: now.into(),
            updated_at: now.into(),
        };

        self.documents
            .write()
            .await
            .insert(document.id, document.clone());

        Ok(document)
    }

    async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.documents.read().await.get(&id).cloned())
    }

    async fn list_documents_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .documents
            .read()
            .await
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();

        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        Ok(self.documents.write().await.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::Duplicate {
                message: "User with this email already exists".to_string(),
            });
        }

        let now = chrono::Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now.into(),
            updated_at: now.into(),
        };
        users.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{EntityList, EntityType, NamedEntity};

    fn new_doc(owner_id: Uuid, title: &str) -> NewDocument {
        NewDocument {
            title: title.to_string(),
            storage_url: format!("memory://{}", title),
            storage_id: title.to_string(),
            raw_text: "raw".to_string(),
            cleaned_text: "clean".to_string(),
            entities: EntityList(vec![NamedEntity::new("Oslo", EntityType::Location)]),
            owner_id,
        }
    }

    #[tokio::test]
    async fn test_list_filters_by_owner_newest_first() {
        let repo = MemoryRepository::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        repo.create_document(new_doc(alice, "first.pdf")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        repo.create_document(new_doc(alice, "second.pdf")).await.unwrap();
        repo.create_document(new_doc(bob, "other.pdf")).await.unwrap();

        let docs = repo.list_documents_by_owner(alice).await.unwrap();
        let titles: Vec<_> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["second.pdf", "first.pdf"]);
    }

    #[tokio::test]
    async fn test_delete_reports_missing() {
        let repo = MemoryRepository::new();
        let doc = repo.create_document(new_doc(Uuid::new_v4(), "a.pdf")).await.unwrap();

        assert!(repo.delete_document(doc.id).await.unwrap());
        assert!(!repo.delete_document(doc.id).await.unwrap());
        assert!(repo.find_document_by_id(doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = MemoryRepository::new();
        let user = NewUser {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: "hash".into(),
        };

        repo.create_user(user.clone()).await.unwrap();
        let err = repo.create_user(user).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate { .. }));
    }
}
