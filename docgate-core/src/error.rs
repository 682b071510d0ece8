//! Error types and result types for query construction and store operations.
//!
//! This module provides error handling for every layer of the crate: the builder
//! reports [`DocumentStoreError::Configuration`] for requests it cannot render, and
//! the gateway wraps every store failure in [`DocumentStoreError::StoreOperation`].
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when building or executing queries.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The builder was asked for something it cannot render, such as a `Where`
    /// filter or an array field built from a non-sequence value.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A store call failed. Carries the collection and operation it was issued for.
    #[error("Store operation {operation} on collection {collection} failed: {source}")]
    StoreOperation {
        /// The collection the operation targeted.
        collection: String,
        /// The gateway operation name (`First`, `Find`, `InsertOne`, ...).
        operation: String,
        /// The underlying failure.
        #[source]
        source: Box<DocumentStoreError>,
    },
    /// A raw filter literal could not be parsed into a store-native document.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    /// The document violates structural constraints (missing audit author, not an object, ...).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Wraps `cause` with the collection and operation it occurred in.
    pub fn store_operation(
        collection: impl Into<String>,
        operation: impl Into<String>,
        cause: DocumentStoreError,
    ) -> Self {
        DocumentStoreError::StoreOperation {
            collection: collection.into(),
            operation: operation.into(),
            source: Box::new(cause),
        }
    }

    /// Returns `true` for errors raised by the builder before any store call.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DocumentStoreError::Configuration(_))
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
