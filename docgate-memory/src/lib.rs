//! In-memory document storage backend for docgate.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Store-native documents** - Filters, updates and projections are plain BSON documents
//! - **Shell matching rules** - Logical, comparison, membership and regex operators over dotted paths
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let customers = CustomerGateway::for_record(backend);
//!
//!     let alice = json!({ "name": "Alice", "email": "a@x.com" });
//!     customers.insert_one(alice.as_object().unwrap()).await?;
//!
//!     let found = customers.first(&FindRequest::new().filter("name", "Alice")).await?;
//!     assert!(found.is_some());
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_memory;

mod evaluator;
mod store;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
