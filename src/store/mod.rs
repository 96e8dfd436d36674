//! Document store collaborator.
//!
//! Routes persist profiles and registrations through [`DocumentStore`]. The
//! production database lives behind this trait; [`MemoryDocumentStore`] backs
//! local runs and tests.

use std::fmt::Debug;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};
use thiserror::Error;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("document store unavailable: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Write a document. With `merge`, top-level fields of `data` overwrite
    /// existing fields and the rest are kept; without it the document is
    /// replaced.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        merge: bool,
    ) -> Result<(), StoreError>;

    /// Merge fields into an existing document. Fails with
    /// [`StoreError::NotFound`] if it does not exist.
    async fn update(&self, collection: &str, id: &str, partial: Document)
        -> Result<(), StoreError>;

    /// Insert only if absent. Returns `false` when the document already exists.
    async fn create(&self, collection: &str, id: &str, data: Document) -> Result<bool, StoreError>;

    /// Merge `fields` into the document in one atomic step. When the document
    /// is absent it is created from `fields` plus `on_create`. Returns `true`
    /// if it was created.
    async fn merge_or_create(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        on_create: Document,
    ) -> Result<bool, StoreError>;

    /// Atomically add `value` to the array `field` unless already present.
    /// A missing or non-array field becomes a one-element array. Fails with
    /// [`StoreError::NotFound`] if the document does not exist.
    async fn append_unique(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError>;
}

/// In-process store keyed by `(collection, id)`.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<(String, String), Document>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .count()
    }

    fn key(collection: &str, id: &str) -> (String, String) {
        (collection.to_string(), id.to_string())
    }
}

fn merge_into(target: &mut Document, fields: Document) {
    for (field, value) in fields {
        target.insert(field, value);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .documents
            .get(&Self::key(collection, id))
            .map(|doc| doc.value().clone()))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        merge: bool,
    ) -> Result<(), StoreError> {
        match self.documents.entry(Self::key(collection, id)) {
            Entry::Occupied(mut existing) if merge => merge_into(existing.get_mut(), data),
            Entry::Occupied(mut existing) => {
                existing.insert(data);
            }
            Entry::Vacant(slot) => {
                slot.insert(data);
            }
        }
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        partial: Document,
    ) -> Result<(), StoreError> {
        match self.documents.get_mut(&Self::key(collection, id)) {
            Some(mut existing) => {
                merge_into(existing.value_mut(), partial);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn create(&self, collection: &str, id: &str, data: Document) -> Result<bool, StoreError> {
        match self.documents.entry(Self::key(collection, id)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(data);
                Ok(true)
            }
        }
    }

    async fn merge_or_create(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        on_create: Document,
    ) -> Result<bool, StoreError> {
        match self.documents.entry(Self::key(collection, id)) {
            Entry::Occupied(mut existing) => {
                merge_into(existing.get_mut(), fields);
                Ok(false)
            }
            Entry::Vacant(slot) => {
                let mut document = on_create;
                merge_into(&mut document, fields);
                slot.insert(document);
                Ok(true)
            }
        }
    }

    async fn append_unique(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let mut existing = self
            .documents
            .get_mut(&Self::key(collection, id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        match existing.value_mut().get_mut(field) {
            Some(Value::Array(items)) => {
                if !items.contains(&value) {
                    items.push(value);
                }
            }
            _ => {
                existing
                    .value_mut()
                    .insert(field.to_string(), Value::Array(vec![value]));
            }
        }
        Ok(())
    }
}
