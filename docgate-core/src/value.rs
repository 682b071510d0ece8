//! The generic value model and its conversions to and from store-native BSON.
//!
//! Callers hand the crate loosely-typed documents: ordered maps from field name to
//! [`Value`]. [`Value`] is `serde_json::Value`, which already is the closed variant
//! set { null, bool, number, string, document, list }, and [`Document`] is its
//! insertion-ordered object map. The builder converts these into `bson` values when
//! it emits query definitions, and the gateway converts store results back.

use bson::Bson;
use serde_json::Number;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A single document field value.
pub use serde_json::Value;

/// An ordered mapping from unique field names to [`Value`]s.
pub type Document = serde_json::Map<String, Value>;

/// The conventional record identifier field.
pub const ID_FIELD: &str = "_id";

/// Converts a generic value into its BSON form.
///
/// Integers become `Int32` when they fit and `Int64` otherwise, every other number
/// becomes a `Double`.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] for an unsigned integer above
/// `i64::MAX`, which BSON cannot hold without losing precision.
pub fn to_bson(value: &Value) -> DocumentStoreResult<Bson> {
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => number_to_bson(n)?,
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect::<DocumentStoreResult<_>>()?),
        Value::Object(map) => Bson::Document(to_bson_document(map)?),
    })
}

/// Converts a generic document into a BSON document, keeping field order.
pub fn to_bson_document(document: &Document) -> DocumentStoreResult<bson::Document> {
    document
        .iter()
        .map(|(key, value)| Ok((key.clone(), to_bson(value)?)))
        .collect()
}

/// Converts a BSON value read from a store back into a generic value.
pub fn from_bson(bson: Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::Double(f) => Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s),
        Bson::Array(items) => Value::Array(items.into_iter().map(from_bson).collect()),
        Bson::Document(doc) => Value::Object(from_bson_document(doc)),
        Bson::DateTime(dt) => Value::String(dt.to_chrono().to_rfc3339()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        other => Value::String(other.to_string()),
    }
}

/// Converts a BSON document read from a store back into a generic document.
pub fn from_bson_document(document: bson::Document) -> Document {
    document
        .into_iter()
        .map(|(key, value)| (key, from_bson(value)))
        .collect()
}

/// Reads a nested document from either an object value or a JSON string.
///
/// Any other value is a configuration error; a string that is not a JSON object is
/// a serialization error.
pub fn json_document(value: &Value) -> DocumentStoreResult<bson::Document> {
    match value {
        Value::Object(map) => to_bson_document(map),
        Value::String(json) => match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => to_bson_document(&map),
            _ => Err(DocumentStoreError::Serialization(format!(
                "expected a JSON object, got {json}"
            ))),
        },
        other => Err(DocumentStoreError::Configuration(format!(
            "cannot read a nested document from {other}"
        ))),
    }
}

/// Builds a BSON regular expression, normalizing the option flags.
pub(crate) fn regex_bson(pattern: &str, options: &str) -> Option<Bson> {
    let mut flags = options.chars().collect::<Vec<_>>();
    flags.sort_unstable();
    flags.dedup();

    Bson::try_from(serde_json::json!({
        "$regularExpression": {
            "pattern": pattern,
            "options": flags.into_iter().collect::<String>(),
        }
    }))
    .ok()
}

fn number_to_bson(n: &Number) -> DocumentStoreResult<Bson> {
    if let Some(i) = n.as_i64() {
        Ok(i32::try_from(i)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(i)))
    } else if n.is_u64() {
        Err(DocumentStoreError::InvalidDocument(format!(
            "integer {n} is out of range for a 64-bit signed value"
        )))
    } else {
        Ok(Bson::Double(n.as_f64().unwrap_or(f64::NAN)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    #[test]
    fn numbers_pick_the_narrowest_bson_type() {
        assert_eq!(to_bson(&json!(7)).unwrap(), Bson::Int32(7));
        assert_eq!(to_bson(&json!(5_000_000_000i64)).unwrap(), Bson::Int64(5_000_000_000));
        assert_eq!(to_bson(&json!(1.5)).unwrap(), Bson::Double(1.5));
        assert_eq!(to_bson(&json!(i64::MAX as u64)).unwrap(), Bson::Int64(i64::MAX));
    }

    #[test]
    fn unsigned_integers_beyond_i64_are_rejected() {
        let err = to_bson(&json!({ "counter": [u64::MAX] })).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[test]
    fn documents_keep_field_order() {
        let value = json!({ "zeta": 1, "alpha": { "nested": [true, null] }, "mid": "x" });
        let document = to_bson_document(value.as_object().unwrap()).unwrap();

        assert_eq!(
            document.keys().collect::<Vec<_>>(),
            vec!["zeta", "alpha", "mid"]
        );
        assert_eq!(
            document,
            doc! { "zeta": 1, "alpha": { "nested": [true, Bson::Null] }, "mid": "x" }
        );
    }

    #[test]
    fn store_results_convert_back() {
        let oid = bson::oid::ObjectId::new();
        let converted = from_bson_document(doc! {
            "_id": oid,
            "count": 3i64,
            "ratio": 0.25,
            "tags": ["a", "b"],
        });

        assert_eq!(converted["_id"], json!(oid.to_hex()));
        assert_eq!(converted["count"], json!(3));
        assert_eq!(converted["ratio"], json!(0.25));
        assert_eq!(converted["tags"], json!(["a", "b"]));
    }

    #[test]
    fn json_document_accepts_objects_and_json_strings() {
        assert_eq!(
            json_document(&json!({ "city": "Oslo" })).unwrap(),
            doc! { "city": "Oslo" }
        );
        assert_eq!(
            json_document(&json!("{\"city\":\"Oslo\"}")).unwrap(),
            doc! { "city": "Oslo" }
        );
        assert!(matches!(
            json_document(&json!("[1, 2]")),
            Err(DocumentStoreError::Serialization(_))
        ));
        assert!(json_document(&json!(42)).unwrap_err().is_configuration());
    }

    #[test]
    fn regex_flags_are_sorted() {
        assert_eq!(regex_bson("^a", "mi"), regex_bson("^a", "im"));
        assert!(regex_bson("^a", "i").is_some());
    }
}
