//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory backend that keeps every collection as an
//! insertion-ordered list of BSON documents behind an async-safe read-write lock.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::trace;

use docgate_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    value::ID_FIELD,
};

use crate::{
    evaluator::DocumentEvaluator,
    update::{apply_update, project},
};

type Collection = Vec<Document>;
type StoreMap = HashMap<String, Collection>;

/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait with the matching, update and
/// projection rules of a document store shell, evaluated directly over BSON.
/// Documents keep their insertion order, which is the order finds return them in.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). For small to medium
/// datasets this is typically acceptable. For larger datasets, use the MongoDB
/// backend.
///
/// # Example
///
/// ```ignore
/// use docgate_memory::InMemoryStore;
/// use docgate::backend::StoreBackend;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.insert_one("customers", doc! { "_id": "C1", "name": "Alice" }).await?;
///
///     let found = store.find_one("customers", doc! { "name": "Alice" }, None).await?;
///     assert!(found.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// ```ignore
    /// use docgate_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().build().await.unwrap();
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Number of documents currently held in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.store
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Names of every collection that has received a document.
    pub async fn list_collections(&self) -> Vec<String> {
        self.store.read().await.keys().cloned().collect()
    }
}

/// Position of the first document in `collection` matching `filter`.
fn position(collection: &Collection, filter: &Document) -> DocumentStoreResult<Option<usize>> {
    for (index, document) in collection.iter().enumerate() {
        if DocumentEvaluator::new(document).matches(filter)? {
            return Ok(Some(index));
        }
    }

    Ok(None)
}

fn with_projection(document: &Document, projection: Option<&Document>) -> DocumentStoreResult<Document> {
    match projection {
        Some(projection) if !projection.is_empty() => project(document, projection),
        _ => Ok(document.clone()),
    }
}

/// Assigns an `ObjectId` when `_id` is missing and rejects a duplicate `_id`.
fn prepare_insert(collection: &Collection, name: &str, mut document: Document) -> DocumentStoreResult<Document> {
    match document.get(ID_FIELD) {
        Some(id) => {
            if collection.iter().any(|existing| existing.get(ID_FIELD) == Some(id)) {
                return Err(DocumentStoreError::DocumentAlreadyExists(
                    id_string(id),
                    name.to_string(),
                ));
            }
        }
        None => {
            let mut with_id = Document::new();
            with_id.insert(ID_FIELD, ObjectId::new());
            for (key, value) in document {
                with_id.insert(key, value);
            }
            document = with_id;
        }
    }

    Ok(document)
}

fn id_string(id: &Bson) -> String {
    match id {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

fn update_first(collection: &mut Collection, filter: &Document, update: &Document) -> DocumentStoreResult<()> {
    match position(collection, filter)? {
        Some(index) => apply_update(&mut collection[index], update),
        None => {
            // Still reject malformed updates when nothing matches.
            apply_update(&mut Document::new(), update)?;
            trace!(%filter, "update matched no document");
            Ok(())
        }
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DocumentStoreResult<Option<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(None);
        };

        match position(documents, &filter)? {
            Some(index) => with_projection(&documents[index], projection.as_ref()).map(Some),
            None => Ok(None),
        }
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
        skip: u64,
        limit: u64,
    ) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut found = Vec::new();
        let mut skipped = 0u64;

        for document in documents {
            if limit > 0 && found.len() as u64 >= limit {
                break;
            }
            if !DocumentEvaluator::new(document).matches(&filter)? {
                continue;
            }
            if skipped < skip {
                skipped += 1;
                continue;
            }

            found.push(with_projection(document, projection.as_ref())?);
        }

        Ok(found)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        let document = prepare_insert(documents, collection, document)?;
        documents.push(document);

        Ok(())
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let existing = store.entry(collection.to_string()).or_default();

        // Documents before the first failure stay inserted, as with an ordered insert.
        for document in documents {
            let document = prepare_insert(existing, collection, document)?;
            existing.push(document);
        }

        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let mut missing = Collection::new();
        let documents = store.get_mut(collection).unwrap_or(&mut missing);

        update_first(documents, &filter, &update)
    }

    async fn bulk_update(
        &self,
        collection: &str,
        updates: Vec<(Document, Document)>,
    ) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let mut missing = Collection::new();
        let documents = store.get_mut(collection).unwrap_or(&mut missing);

        for (filter, update) in &updates {
            update_first(documents, filter, update)?;
        }

        Ok(())
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(());
        };

        if let Some(index) = position(documents, &filter)? {
            documents.remove(index);
        }

        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use docgate_memory::InMemoryStore;
/// use docgate::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new, empty [`InMemoryStore`].
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}
