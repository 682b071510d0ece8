//! Update operators and projections for in-memory documents.

use bson::{Bson, Document};

use docgate_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::ID_FIELD,
};

use crate::evaluator::lookup;

/// Applies an operator update document (`$set`, `$unset`, `$inc`, `$push`) in place.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] for an empty update, a replacement
/// document, an unsupported operator, a type mismatch, or a change to `_id`. The
/// document is left untouched on error.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> DocumentStoreResult<()> {
    if update.is_empty() {
        return Err(DocumentStoreError::InvalidDocument(
            "update document must contain at least one operator".to_string(),
        ));
    }

    let mut updated = document.clone();

    for (operator, fields) in update {
        let fields = fields.as_document().ok_or_else(|| {
            DocumentStoreError::InvalidDocument(format!("{operator} expects a document of fields"))
        })?;

        for (path, value) in fields {
            match operator.as_str() {
                "$set" => set_path(&mut updated, path, value.clone())?,
                "$unset" => unset_path(&mut updated, path),
                "$inc" => {
                    let current = lookup(&updated, path).first().copied().cloned();
                    set_path(&mut updated, path, increment(path, current, value)?)?;
                }
                "$push" => {
                    let additions = match value {
                        Bson::Document(each) if each.contains_key("$each") => each
                            .get_array("$each")
                            .map_err(|_| {
                                DocumentStoreError::InvalidDocument(format!("$each on {path} expects an array"))
                            })?
                            .clone(),
                        single => vec![single.clone()],
                    };

                    let mut items = match lookup(&updated, path).first() {
                        None => Vec::new(),
                        Some(Bson::Array(items)) => items.clone(),
                        Some(other) => {
                            return Err(DocumentStoreError::InvalidDocument(format!(
                                "cannot push onto non-array field {path} ({other})"
                            )));
                        }
                    };
                    items.extend(additions);
                    set_path(&mut updated, path, Bson::Array(items))?;
                }
                other => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "unsupported update operator {other}"
                    )));
                }
            }
        }
    }

    if updated.get(ID_FIELD) != document.get(ID_FIELD) {
        return Err(DocumentStoreError::InvalidDocument(format!(
            "update would modify the immutable field {ID_FIELD}"
        )));
    }

    *document = updated;
    Ok(())
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(nested)) => set_path(nested, rest, value),
                _ => Err(DocumentStoreError::InvalidDocument(format!(
                    "cannot create field {rest} inside non-document field {head}"
                ))),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(nested)) = document.get_mut(head) {
                unset_path(nested, rest);
            }
        }
    }
}

fn increment(path: &str, current: Option<Bson>, by: &Bson) -> DocumentStoreResult<Bson> {
    let mismatch = || DocumentStoreError::InvalidDocument(format!("cannot increment {path} by {by}"));

    let overflow = || DocumentStoreError::InvalidDocument(format!("incrementing {path} by {by} overflows"));

    Ok(match (current.unwrap_or(Bson::Int32(0)), by) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => {
            Bson::Int64(i64::from(a).checked_add(*b).ok_or_else(overflow)?)
        }
        (Bson::Int64(a), Bson::Int32(b)) => {
            Bson::Int64(a.checked_add(i64::from(*b)).ok_or_else(overflow)?)
        }
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b).ok_or_else(overflow)?),
        (Bson::Double(a), b) => Bson::Double(a + as_f64(b).ok_or_else(mismatch)?),
        (a, Bson::Double(b)) => Bson::Double(as_f64(&a).ok_or_else(mismatch)? + b),
        _ => return Err(mismatch()),
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Applies an inclusion or exclusion projection.
///
/// `_id` is included unless excluded explicitly. Mixing inclusions and exclusions
/// of other fields is an error.
pub(crate) fn project(document: &Document, projection: &Document) -> DocumentStoreResult<Document> {
    let includes = projection
        .iter()
        .filter(|(field, _)| field.as_str() != ID_FIELD)
        .map(|(_, flag)| included(flag))
        .collect::<Vec<_>>();

    let inclusive = includes.iter().any(|include| *include);
    if inclusive && includes.iter().any(|include| !include) {
        return Err(DocumentStoreError::InvalidFilter(
            "projection cannot mix inclusions and exclusions".to_string(),
        ));
    }

    let keep_id = projection.get(ID_FIELD).is_none_or(included);

    if !inclusive {
        let mut projected = document.clone();
        for (field, _) in projection.iter().filter(|(field, _)| field.as_str() != ID_FIELD) {
            unset_path(&mut projected, field);
        }
        if !keep_id {
            projected.remove(ID_FIELD);
        }
        return Ok(projected);
    }

    let mut projected = Document::new();

    if keep_id {
        if let Some(id) = document.get(ID_FIELD) {
            projected.insert(ID_FIELD, id.clone());
        }
    }

    for (field, _) in projection.iter().filter(|(field, _)| field.as_str() != ID_FIELD) {
        if let Some(value) = lookup(document, field).first() {
            set_path(&mut projected, field, (*value).clone())?;
        }
    }

    Ok(projected)
}

fn included(flag: &Bson) -> bool {
    match flag {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn product() -> Document {
        doc! {
            "_id": "P1",
            "name": "bolt",
            "stock": 10,
            "tags": ["steel"],
            "modified": { "by": { "_id": "U1", "name": "admin" } },
        }
    }

    #[test]
    fn set_unset_and_nested_paths() {
        let mut document = product();

        apply_update(
            &mut document,
            &doc! {
                "$set": { "name": "hex bolt", "modified.by.name": "editor", "dims.len": 40 },
                "$unset": { "tags": "" },
            },
        )
        .unwrap();

        assert_eq!(
            document,
            doc! {
                "_id": "P1",
                "name": "hex bolt",
                "stock": 10,
                "modified": { "by": { "_id": "U1", "name": "editor" } },
                "dims": { "len": 40 },
            }
        );
    }

    #[test]
    fn inc_keeps_integer_types_and_creates_missing_fields() {
        let mut document = product();

        apply_update(&mut document, &doc! { "$inc": { "stock": -3, "sold": 3, "rating": 0.5 } }).unwrap();

        assert_eq!(document.get("stock"), Some(&Bson::Int32(7)));
        assert_eq!(document.get("sold"), Some(&Bson::Int32(3)));
        assert_eq!(document.get("rating"), Some(&Bson::Double(0.5)));
    }

    #[test]
    fn inc_widens_int32_and_rejects_int64_overflow() {
        assert_eq!(
            increment("n", Some(Bson::Int32(i32::MAX)), &Bson::Int32(1)).unwrap(),
            Bson::Int64(i32::MAX as i64 + 1)
        );
        assert!(increment("n", Some(Bson::Int64(i64::MAX)), &Bson::Int64(1)).is_err());
        assert!(increment("n", Some(Bson::Int64(i64::MIN)), &Bson::Int32(-1)).is_err());
        assert!(increment("n", Some(Bson::Int32(1)), &Bson::Int64(i64::MAX)).is_err());

        let mut document = doc! { "_id": "P1", "n": i64::MAX };
        let err = apply_update(&mut document, &doc! { "$inc": { "n": 1i64 } }).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
        assert_eq!(document.get("n"), Some(&Bson::Int64(i64::MAX)));
    }

    #[test]
    fn push_appends_single_values_and_each_lists() {
        let mut document = product();

        apply_update(
            &mut document,
            &doc! { "$push": { "tags": { "$each": ["zinc", "m6"] }, "history": { "v": 1 } } },
        )
        .unwrap();

        assert_eq!(document.get_array("tags").unwrap().len(), 3);
        assert_eq!(document.get_array("history").unwrap(), &vec![Bson::Document(doc! { "v": 1 })]);
    }

    #[test]
    fn invalid_updates_leave_the_document_untouched() {
        for update in [
            doc! {},
            doc! { "name": "replacement" },
            doc! { "$rename": { "name": "title" } },
            doc! { "$inc": { "name": 1 } },
            doc! { "$push": { "name": "x" } },
            doc! { "$set": { "_id": "P2" } },
            doc! { "$set": { "name.first": "x" } },
        ] {
            let mut document = product();
            assert!(apply_update(&mut document, &update).is_err(), "{update} should fail");
            assert_eq!(document, product());
        }
    }

    #[test]
    fn inclusion_projection_keeps_id_unless_excluded() {
        let projected = project(&product(), &doc! { "name": 1, "modified.by.name": 1 }).unwrap();
        assert_eq!(
            projected,
            doc! { "_id": "P1", "name": "bolt", "modified": { "by": { "name": "admin" } } }
        );

        let without_id = project(&product(), &doc! { "_id": 0, "stock": 1 }).unwrap();
        assert_eq!(without_id, doc! { "stock": 10 });
    }

    #[test]
    fn exclusion_projection_drops_fields() {
        let projected = project(&product(), &doc! { "tags": 0, "modified": 0 }).unwrap();

        assert_eq!(projected, doc! { "_id": "P1", "name": "bolt", "stock": 10 });
        assert!(project(&product(), &doc! { "name": 1, "stock": 0 }).is_err());
    }
}
