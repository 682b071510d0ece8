//! Storage backend abstraction.
//!
//! This module defines the traits that abstract over document store implementations,
//! allowing the [`Gateway`](crate::gateway::Gateway) to run against MongoDB, an in-memory
//! store, or anything else that speaks store-native documents.
//!
//! # Overview
//!
//! The [`StoreBackend`] trait takes already-resolved `bson` filter, projection and
//! update documents. Raw filter literals are parsed before they get here, so a backend
//! never sees the shell mini-language.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docgate::backend::StoreBackend;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! backend.insert_one("customers", doc! { "_id": "C1", "name": "Alice" }).await?;
//! let found = backend.find_one("customers", doc! { "name": "Alice" }, None).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::{fmt::Debug, sync::Arc};

use crate::error::DocumentStoreResult;

/// Abstract interface for document storage backends.
///
/// Every method is a single request and a single response. Implementations decide
/// how to serve concurrent callers; the gateway adds no concurrency of its own.
///
/// # Documents
///
/// Filters are store-native query documents where the empty document matches
/// everything. Projections are inclusion documents (`{field: 1, ...}`). Updates are
/// operator documents (`{$set: {...}, $inc: {...}, $push: {...}}`).
///
/// # Error Handling
///
/// Backends report their own failure kinds (for example
/// [`DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists)
/// or [`Backend`](crate::error::DocumentStoreError::Backend)). The gateway wraps them
/// with the collection and operation that failed.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the first document matching `filter`, or `None` if nothing matches.
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Returns the documents matching `filter` in store order, after skipping `skip`
    /// matches and returning at most `limit`.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
        skip: u64,
        limit: u64,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Inserts one document. The collection is created if it doesn't exist.
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<()>;

    /// Inserts documents in order.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<()>;

    /// Applies `update` to the first document matching `filter`. Matching nothing is
    /// not an error.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<()>;

    /// Applies each `(filter, update)` pair as an [`update_one`](Self::update_one),
    /// in order, stopping at the first failure.
    async fn bulk_update(
        &self,
        collection: &str,
        updates: Vec<(Document, Document)>,
    ) -> DocumentStoreResult<()>;

    /// Deletes the first document matching `filter`. Matching nothing is not an error.
    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external connections
    /// should override this.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend + ?Sized,
{
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).find_one(collection, filter, projection).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
        skip: u64,
        limit: u64,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self)
            .find(collection, filter, projection, skip, limit)
            .await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<()> {
        (**self).insert_one(collection, document).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<()> {
        (**self).insert_many(collection, documents).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<()> {
        (**self).update_one(collection, filter, update).await
    }

    async fn bulk_update(
        &self,
        collection: &str,
        updates: Vec<(Document, Document)>,
    ) -> DocumentStoreResult<()> {
        (**self).bulk_update(collection, updates).await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<()> {
        (**self).delete_one(collection, filter).await
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend + ?Sized,
{
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).find_one(collection, filter, projection).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
        skip: u64,
        limit: u64,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self)
            .find(collection, filter, projection, skip, limit)
            .await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<()> {
        (**self).insert_one(collection, document).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<()> {
        (**self).insert_many(collection, documents).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<()> {
        (**self).update_one(collection, filter, update).await
    }

    async fn bulk_update(
        &self,
        collection: &str,
        updates: Vec<(Document, Document)>,
    ) -> DocumentStoreResult<()> {
        (**self).bulk_update(collection, updates).await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<()> {
        (**self).delete_one(collection, filter).await
    }
}

/// Factory for backend instances that need asynchronous setup.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
