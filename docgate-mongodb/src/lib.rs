//! MongoDB backend for docgate.
//!
//! [`MongoDbStore`] runs each gateway call as one driver call against a single
//! database. Bulk updates are issued as sequential `update_one` calls.
//!
//! Enable it through the facade crate's `mongodb` feature:
//!
//! ```toml
//! [dependencies]
//! docgate = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docgate::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! let store = MongoDbStore::builder("mongodb://localhost:27017/shop")
//!     .build()
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_mongodb;

mod options;
mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
