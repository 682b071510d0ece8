//! Query construction and execution for document stores.
//!
//! This crate is the core of the docgate project and provides:
//!
//! - **Value model** ([`value`]) - Ordered generic documents and their BSON conversions
//! - **Query algebra** ([`filter`]) - Typed filter expressions and compound filters
//! - **Raw filter parser** ([`literal`]) - The shell-style filter mini-language
//! - **Query definitions** ([`definition`]) - Immutable, operation-specific queries
//! - **Query builder** ([`builder`]) - The accumulate-then-emit builder
//! - **Record schemas** ([`schema`]) - Declared fields and the schema trimmer
//! - **Model queries** ([`model`]) - Per-record query providers
//! - **Store backend abstraction** ([`backend`]) - Traits for storage backends
//! - **Gateway** ([`gateway`]) - Executes definitions and wraps store failures
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryStore};
//!
//! #[derive(Schema)]
//! #[schema(collection = "customers")]
//! pub struct Customer {
//!     pub _id: String,
//!     pub name: String,
//!     pub email: String,
//! }
//!
//! let customers = RecordGateway::<_, SchemaModelQuery<Customer>>::for_record(InMemoryStore::new());
//! let alice = customers.first(&FindRequest::new().filter("name", "Alice")).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_core;

pub mod backend;
pub mod builder;
pub mod definition;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod literal;
pub mod model;
pub mod schema;
pub mod value;
