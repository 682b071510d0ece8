//! Compile-time record schemas and the schema trimmer.
//!
//! Every record kind declares its collection and the ordered list of its field names
//! through [`Schema`], usually via `#[derive(Schema)]`. Writes go through [`trim`],
//! which keeps only declared fields: undeclared input is dropped, never rejected.
//!
//! The audit fields in [`RESERVED_FIELDS`] are never copied by trimming. They are
//! only written through audit stamping, see [`SchemaModelQuery`](crate::model::SchemaModelQuery).

use uuid::Uuid;

use crate::value::{Document, ID_FIELD, Value};

/// Audit-trail fields excluded from trimming.
pub const RESERVED_FIELDS: [&str; 2] = ["created", "modified"];

/// Static description of a record kind.
///
/// # Example
///
/// ```ignore
/// use docgate::Schema;
///
/// #[derive(Schema)]
/// #[schema(collection = "customers")]
/// pub struct Customer {
///     pub _id: String,
///     pub name: String,
///     pub email: String,
/// }
///
/// assert_eq!(Customer::fields(), &["_id", "name", "email"]);
/// ```
pub trait Schema {
    /// Name of the collection holding records of this kind.
    fn collection_name() -> &'static str;

    /// Declared field names, in declaration order.
    fn fields() -> &'static [&'static str];

    /// Returns `true` if the record declares `field`.
    fn declares(field: &str) -> bool {
        Self::fields().contains(&field)
    }
}

pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// Restricts `document` to the declared `fields`, keeping the document's own order.
pub fn trim(document: &Document, fields: &[&str]) -> Document {
    trim_excluding(document, fields, &[])
}

/// Like [`trim`], additionally dropping every field in `exclude`.
pub fn trim_excluding(document: &Document, fields: &[&str], exclude: &[&str]) -> Document {
    document
        .iter()
        .filter(|(key, _)| {
            let key = key.as_str();
            fields.contains(&key) && !is_reserved(key) && !exclude.contains(&key)
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Drops every field in `fields` and the reserved audit fields, keeping the rest.
pub fn exclude(document: &Document, fields: &[&str]) -> Document {
    document
        .iter()
        .filter(|(key, _)| !is_reserved(key) && !fields.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// A fresh record identifier: an upper-case UUID v4.
pub fn new_id() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

/// Returns `document` with `_id` as its first field, generating one if absent.
pub fn with_id_first(mut document: Document) -> Document {
    let id = document
        .shift_remove(ID_FIELD)
        .unwrap_or_else(|| Value::String(new_id()));

    let mut ordered = Document::with_capacity(document.len() + 1);
    ordered.insert(ID_FIELD.to_string(), id);
    ordered.extend(document);
    ordered
}
