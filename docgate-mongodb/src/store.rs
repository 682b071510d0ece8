use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::{Client, Collection as MongoCollection, options::ClientOptions};
use tracing::debug;

use docgate_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    value::ID_FIELD,
};

use crate::options::{backend_error, find_one_options, find_options, insert_error};

/// A [`StoreBackend`] over the official MongoDB driver.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    /// Starts a builder for `dsn`. Without an explicit database the DSN's default
    /// database is used.
    pub fn builder(dsn: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

fn id_string(document: &Document) -> Option<String> {
    document.get(ID_FIELD).map(|id| match id {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    })
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> DocumentStoreResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(filter)
            .with_options(find_one_options(projection))
            .await
            .map_err(backend_error)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
        skip: u64,
        limit: u64,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.get_collection(collection)
            .find(filter)
            .with_options(find_options(projection, skip, limit))
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<()> {
        let id = id_string(&document);

        self.get_collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| insert_error(e, id, collection))?;

        Ok(())
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        self.get_collection(collection)
            .insert_many(documents)
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<()> {
        let result = self
            .get_collection(collection)
            .update_one(filter, update)
            .await
            .map_err(backend_error)?;

        debug!(
            collection,
            matched = result.matched_count,
            modified = result.modified_count,
            "update_one applied"
        );

        Ok(())
    }

    async fn bulk_update(
        &self,
        collection: &str,
        updates: Vec<(Document, Document)>,
    ) -> DocumentStoreResult<()> {
        let collection_handle = self.get_collection(collection);

        for (filter, update) in updates {
            collection_handle
                .update_one(filter, update)
                .await
                .map_err(backend_error)?;
        }

        Ok(())
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .delete_one(filter)
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown().await
    }
}

/// Connects a [`MongoDbStore`] from a connection string.
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: Option<String>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: None,
        }
    }

    /// Overrides the database named in the connection string.
    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        let database = self
            .database
            .or_else(|| options.default_database.clone())
            .ok_or_else(|| {
                DocumentStoreError::Initialization(
                    "no database given and the connection string names none".to_string(),
                )
            })?;

        debug!(database = %database, "connecting to MongoDB");

        Ok(MongoDbStore::new(
            Client::with_options(options)
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            database,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn id_strings_prefer_plain_strings() {
        assert_eq!(id_string(&doc! { "_id": "C1" }), Some("C1".to_string()));
        assert_eq!(id_string(&doc! { "_id": 7 }), Some("7".to_string()));
        assert_eq!(id_string(&doc! { "name": "x" }), None);
    }

    #[tokio::test]
    async fn builder_falls_back_to_the_connection_string_database() {
        let store = MongoDbStore::builder("mongodb://localhost:27017/shop")
            .build()
            .await
            .unwrap();
        assert_eq!(store.database(), "shop");

        let overridden = MongoDbStore::builder("mongodb://localhost:27017/shop")
            .database("archive")
            .build()
            .await
            .unwrap();
        assert_eq!(overridden.database(), "archive");
    }

    #[tokio::test]
    async fn builder_requires_a_database() {
        let err = MongoDbStore::builder("mongodb://localhost:27017")
            .build()
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::Initialization(_)));
    }
}
