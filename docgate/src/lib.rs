//! Document query construction and execution behind one gateway.
//!
//! This crate is the entry point of the docgate workspace. It re-exports the core
//! query machinery, the store backends, and the record kinds the service stores.
//!
//! # Features
//!
//! - **Query algebra** - Typed filter expressions rendered into store-native filters
//! - **Query builder** - Accumulate filter, projection, insert and update state, then emit one definition
//! - **Schema trimming** - Records declare their fields; everything else is dropped before a write
//! - **Gateway** - Runs definitions against a backend and wraps every failure with its collection and operation
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let customers = CustomerGateway::for_record(InMemoryStore::new());
//!
//!     let alice = json!({ "name": "Alice", "email": "alice@example.com", "age": 41 });
//!     customers.insert_one(alice.as_object().unwrap()).await?;
//!
//!     let found = customers
//!         .first(&FindRequest::new().filter("name", "Alice"))
//!         .await?
//!         .map(from_document::<Customer>)
//!         .transpose()?;
//!
//!     println!("found {found:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires the `mongodb` feature)
//!
//! [`RuntimeSettings::connect`](config::RuntimeSettings::connect) picks one from
//! the environment.

pub mod config;
pub mod prelude;
pub mod records;

pub use docgate_core::{
    backend, builder, definition, error, filter, gateway, literal, model, schema, value,
};
pub use docgate_macros::Schema;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docgate_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docgate_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
