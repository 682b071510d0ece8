//! Convenient re-exports of commonly used types from docgate.
//!
//! ```ignore
//! use docgate::prelude::*;
//! ```

pub use docgate_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    builder::QueryBuilder,
    definition::{FilterDefinition, FindDefinition, QueryDefinition},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{CombineMode, CompoundFilter, FilterExpression, LogicalOperator},
    gateway::{Gateway, Operation, QueryOutcome, RecordGateway},
    model::{FindRequest, ModelQuery, SchemaModelQuery},
    schema::Schema,
    value::{Document, Value},
};
pub use docgate_macros::Schema;

pub use crate::{
    config::{Environment, RuntimeSettings},
    records::{Customer, CustomerGateway, Product, ProductGateway, from_document},
};
