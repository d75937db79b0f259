//! In-memory resume store. Owned by `AppState`, not global: built with
//! `new`, emptied with `clear`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::resume::ResumeDocument;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Resume {0} not found")]
    ResumeNotFound(Uuid),
}

#[derive(Default)]
pub struct DocumentStore {
    documents: RwLock<HashMap<Uuid, ResumeDocument>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        info!("Clearing {} resume document(s)", documents.len());
        documents.clear();
    }

    pub fn create(&self, title: &str, fields: BTreeMap<String, String>) -> ResumeDocument {
        let document = ResumeDocument::new(title, fields);
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document.id, document.clone());
        document
    }

    pub fn get(&self, id: Uuid) -> Option<ResumeDocument> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Current text of a field. `Ok(None)` when the resume exists but the
    /// field was never written.
    pub fn read_field(&self, id: Uuid, field: &str) -> Result<Option<String>, StoreError> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let document = documents.get(&id).ok_or(StoreError::ResumeNotFound(id))?;
        Ok(document.fields.get(field).cloned())
    }

    pub fn write_field(&self, id: Uuid, field: &str, text: &str) -> Result<ResumeDocument, StoreError> {
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        let document = documents.get_mut(&id).ok_or(StoreError::ResumeNotFound(id))?;
        document.fields.insert(field.to_string(), text.to_string());
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    pub fn remove(&self, id: Uuid) -> Option<ResumeDocument> {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }
}
