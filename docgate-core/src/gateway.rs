//! The execution boundary between query definitions and a store backend.
//!
//! A [`Gateway`] is bound to one collection of one [`StoreBackend`]. It hands each
//! definition's relevant pieces to the backend and wraps every failure, including a
//! raw filter literal that does not parse, in
//! [`DocumentStoreError::StoreOperation`] naming the collection and the [`Operation`].
//!
//! [`RecordGateway`] pairs a gateway with a [`ModelQuery`] so callers can work with
//! requests and plain documents instead of definitions.

use std::{fmt, future::Future};

use tracing::{debug, warn};

use crate::{
    backend::StoreBackend,
    definition::{
        BulkUpdateDefinition, DeleteDefinition, FindDefinition, InsertDefinition,
        InsertManyDefinition, QueryDefinition, UpdateDefinition,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    model::{FindRequest, ModelQuery, SchemaModelQuery},
    schema::Schema,
    value::{Document, from_bson_document},
};

/// The gateway operations, named as they appear in wrapped errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    First,
    Find,
    InsertOne,
    InsertMany,
    UpdateOne,
    BulkUpdate,
    DeleteOne,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::First => "First",
            Operation::Find => "Find",
            Operation::InsertOne => "InsertOne",
            Operation::InsertMany => "InsertMany",
            Operation::UpdateOne => "UpdateOne",
            Operation::BulkUpdate => "BulkUpdate",
            Operation::DeleteOne => "DeleteOne",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What [`Gateway::execute`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Documents returned by a find.
    Documents(Vec<Document>),
    /// A write completed.
    Written,
}

/// Executes query definitions against one collection.
///
/// The gateway holds no state besides the backend handle and the collection name,
/// so it can be shared whenever the backend can.
#[derive(Debug, Clone)]
pub struct Gateway<B> {
    backend: B,
    collection: String,
}

impl<B: StoreBackend> Gateway<B> {
    pub fn new(backend: B, collection: impl Into<String>) -> Self {
        Self {
            backend,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the first matching document. No match is `Ok(None)`, not an error.
    pub async fn first(&self, definition: FindDefinition) -> DocumentStoreResult<Option<Document>> {
        self.wrap(Operation::First, async move {
            let filter = definition.filter.resolve()?;
            let found = self
                .backend
                .find_one(&self.collection, filter, definition.projection)
                .await?;

            Ok(found.map(from_bson_document))
        })
        .await
    }

    /// Returns the matching documents within the definition's skip and limit.
    pub async fn find(&self, definition: FindDefinition) -> DocumentStoreResult<Vec<Document>> {
        self.wrap(Operation::Find, async move {
            let filter = definition.filter.resolve()?;
            let found = self
                .backend
                .find(
                    &self.collection,
                    filter,
                    definition.projection,
                    definition.skip,
                    definition.limit,
                )
                .await?;

            Ok(found.into_iter().map(from_bson_document).collect())
        })
        .await
    }

    pub async fn insert_one(&self, definition: InsertDefinition) -> DocumentStoreResult<()> {
        self.wrap(
            Operation::InsertOne,
            self.backend.insert_one(&self.collection, definition.document),
        )
        .await
    }

    pub async fn insert_many(&self, definition: InsertManyDefinition) -> DocumentStoreResult<()> {
        self.wrap(
            Operation::InsertMany,
            self.backend
                .insert_many(&self.collection, definition.documents),
        )
        .await
    }

    pub async fn update_one(&self, definition: UpdateDefinition) -> DocumentStoreResult<()> {
        self.wrap(
            Operation::UpdateOne,
            self.backend.update_one(
                &self.collection,
                definition.filter,
                definition.update.to_document(),
            ),
        )
        .await
    }

    /// Runs every entry as its own update, in order. Entries applied before a failure
    /// stay applied.
    pub async fn bulk_update(&self, definition: BulkUpdateDefinition) -> DocumentStoreResult<()> {
        let updates = definition
            .entries
            .into_iter()
            .map(|entry| (entry.filter, entry.update.to_document()))
            .collect();

        self.wrap(
            Operation::BulkUpdate,
            self.backend.bulk_update(&self.collection, updates),
        )
        .await
    }

    pub async fn delete_one(&self, definition: DeleteDefinition) -> DocumentStoreResult<()> {
        self.wrap(
            Operation::DeleteOne,
            self.backend
                .delete_one(&self.collection, definition.filter),
        )
        .await
    }

    /// Executes any definition. A find runs as [`Gateway::find`].
    pub async fn execute(&self, definition: QueryDefinition) -> DocumentStoreResult<QueryOutcome> {
        match definition {
            QueryDefinition::Find(find) => self.find(find).await.map(QueryOutcome::Documents),
            QueryDefinition::Insert(insert) => self.insert_one(insert).await.map(|_| QueryOutcome::Written),
            QueryDefinition::InsertMany(many) => self.insert_many(many).await.map(|_| QueryOutcome::Written),
            QueryDefinition::Update(update) => self.update_one(update).await.map(|_| QueryOutcome::Written),
            QueryDefinition::BulkUpdate(bulk) => self.bulk_update(bulk).await.map(|_| QueryOutcome::Written),
            QueryDefinition::Delete(delete) => self.delete_one(delete).await.map(|_| QueryOutcome::Written),
        }
    }

    async fn wrap<T, F>(&self, operation: Operation, call: F) -> DocumentStoreResult<T>
    where
        F: Future<Output = DocumentStoreResult<T>>,
    {
        debug!(collection = %self.collection, %operation, "executing store operation");

        call.await.map_err(|cause| {
            warn!(
                collection = %self.collection,
                %operation,
                error = %cause,
                "store operation failed"
            );
            DocumentStoreError::store_operation(&self.collection, operation.as_str(), cause)
        })
    }
}

/// Request-level CRUD for one record kind.
#[derive(Debug, Clone)]
pub struct RecordGateway<B, M> {
    gateway: Gateway<B>,
    model: M,
}

impl<B: StoreBackend, R: Schema> RecordGateway<B, SchemaModelQuery<R>> {
    /// A gateway for the record kind `R`, using its schema-derived queries.
    pub fn for_record(backend: B) -> Self {
        Self::new(backend, SchemaModelQuery::new())
    }
}

impl<B: StoreBackend, M: ModelQuery> RecordGateway<B, M> {
    pub fn new(backend: B, model: M) -> Self {
        let gateway = Gateway::new(backend, model.collection_name());
        Self { gateway, model }
    }

    pub fn gateway(&self) -> &Gateway<B> {
        &self.gateway
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub async fn first(&self, request: &FindRequest) -> DocumentStoreResult<Option<Document>> {
        let definition = self.model.find_query(request)?;
        self.gateway.first(definition).await
    }

    pub async fn find(&self, request: &FindRequest) -> DocumentStoreResult<Vec<Document>> {
        let definition = self.model.find_query(request)?;
        self.gateway.find(definition).await
    }

    pub async fn insert_one(&self, document: &Document) -> DocumentStoreResult<()> {
        let definition = self.model.insert_query(document)?;
        self.gateway.insert_one(definition).await
    }

    pub async fn insert_many(&self, documents: &[Document]) -> DocumentStoreResult<()> {
        let definition = self.model.insert_many_query(documents)?;
        self.gateway.insert_many(definition).await
    }

    pub async fn update_one(&self, filter: &Document, document: &Document) -> DocumentStoreResult<()> {
        let definition = self.model.update_query(filter, document)?;
        self.gateway.update_one(definition).await
    }

    pub async fn bulk_update(&self, entries: &[(Document, Document)]) -> DocumentStoreResult<()> {
        let definition = self.model.bulk_update_query(entries)?;
        self.gateway.bulk_update(definition).await
    }

    pub async fn delete_one(&self, filter: &Document) -> DocumentStoreResult<()> {
        let definition = self.model.delete_query(filter)?;
        self.gateway.delete_one(definition).await
    }
}
