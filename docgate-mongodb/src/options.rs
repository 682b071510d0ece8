//! Driver option and error mapping for MongoDB calls.

use bson::Document;
use mongodb::{
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{FindOneOptions, FindOptions},
};

use docgate_core::error::DocumentStoreError;

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// Builds the options for a `find` call. A limit of zero leaves the cursor unbounded.
pub(crate) fn find_options(projection: Option<Document>, skip: u64, limit: u64) -> FindOptions {
    let mut options = FindOptions::default();

    options.projection = projection;
    if skip > 0 {
        options.skip = Some(skip);
    }
    if limit > 0 {
        options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
    }

    options
}

pub(crate) fn find_one_options(projection: Option<Document>) -> FindOneOptions {
    let mut options = FindOneOptions::default();
    options.projection = projection;
    options
}

/// Maps a driver error to a store error. Duplicate key violations on `id` in
/// `collection` become [`DocumentStoreError::DocumentAlreadyExists`].
pub(crate) fn insert_error(err: MongoError, id: Option<String>, collection: &str) -> DocumentStoreError {
    if let (Some(id), ErrorKind::Write(WriteFailure::WriteError(write))) = (id, err.kind.as_ref()) {
        if write.code == DUPLICATE_KEY {
            return DocumentStoreError::DocumentAlreadyExists(id, collection.to_string());
        }
    }

    backend_error(err)
}

pub(crate) fn backend_error(err: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}
