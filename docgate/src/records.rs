//! The record kinds served by the gateway.
//!
//! Each record derives [`Schema`](crate::schema::Schema), which fixes its collection
//! and the fields the schema trimmer keeps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use docgate_core::{
    error::DocumentStoreResult,
    gateway::RecordGateway,
    model::SchemaModelQuery,
    value::{Document, Value},
};
use docgate_macros::Schema;

/// A customer contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[schema(collection = "customers")]
pub struct Customer {
    pub _id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
}

/// A catalogue product with audit stamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[schema(collection = "products")]
pub struct Product {
    pub _id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<AuditStamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<AuditStamp>,
}

/// When and by whom a record was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub on: DateTime<Utc>,
    pub by: Author,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub _id: String,
    pub name: String,
}

pub type CustomerGateway<B> = RecordGateway<B, SchemaModelQuery<Customer>>;

pub type ProductGateway<B> = RecordGateway<B, SchemaModelQuery<Product>>;

/// Decodes a result document into a typed record.
///
/// # Errors
///
/// Returns a serialization error when the document doesn't fit `T`.
pub fn from_document<T: DeserializeOwned>(document: Document) -> DocumentStoreResult<T> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::schema::Schema;
    use serde_json::json;

    #[test]
    fn records_declare_their_collections_and_fields() {
        assert_eq!(Customer::collection_name(), "customers");
        assert_eq!(Customer::fields(), &["_id", "name", "email", "number"]);

        assert_eq!(Product::collection_name(), "products");
        assert!(Product::declares("created"));
        assert!(Product::declares("modified"));
        assert!(!Customer::declares("created"));
    }

    #[test]
    fn result_documents_decode_into_records() {
        let document = json!({
            "_id": "P1",
            "name": "bolt",
            "category": "hardware",
            "price": 0.25,
            "created": { "on": "2026-03-01T10:00:00Z", "by": { "_id": "U1", "name": "admin" } },
        })
        .as_object()
        .cloned()
        .unwrap();

        let product: Product = from_document(document).unwrap();

        assert_eq!(product.created.unwrap().by.name, "admin");
        assert_eq!(product.modified, None);
    }

    #[test]
    fn mismatched_documents_fail_to_decode() {
        let document = json!({ "_id": "C1", "name": "Alice" }).as_object().cloned().unwrap();

        assert!(from_document::<Customer>(document).is_err());
    }
}
