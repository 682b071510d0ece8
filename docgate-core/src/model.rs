//! Per-record query providers.
//!
//! A [`ModelQuery`] answers "which query definition satisfies this request for this
//! record kind?". [`SchemaModelQuery`] implements it for any [`Schema`] by composing the
//! builder with the schema trimmer:
//!
//! - reads resolve one filter tier from a [`FindRequest`] and default the projection to
//!   the record's declared fields;
//! - inserts trim the document, put `_id` first and stamp declared audit fields;
//! - updates trim the document (never touching `_id`) and refresh `modified`;
//! - deletes use the filter as given.

use std::{fmt, marker::PhantomData};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    builder::QueryBuilder,
    definition::{
        BulkUpdateDefinition, DeleteDefinition, FindDefinition, InsertDefinition,
        InsertManyDefinition, UpdateDefinition,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{CompoundFilter, FilterExpression},
    schema::{RESERVED_FIELDS, Schema, trim, trim_excluding, with_id_first},
    value::{Document, ID_FIELD, Value},
};

const MODIFIED_FIELD: &str = "modified";

/// A read request. At most one filter tier is applied, the first populated one in
/// field order; an empty request matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindRequest {
    /// Raw filter literal.
    pub query: Option<String>,
    /// A single field/value pair.
    pub filter: Option<(String, Value)>,
    /// A full equality map.
    pub filters: Option<Document>,
    /// Field to accepted values.
    pub filter_in: Option<Vec<(String, Vec<Value>)>>,
    pub filter_expression: Option<FilterExpression>,
    pub filter_compound: Option<CompoundFilter>,
    /// Explicit projection. Defaults to every declared field.
    pub project: Option<Vec<String>>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl FindRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some((key.into(), value.into()));
        self
    }

    pub fn filters(mut self, filters: Document) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn filter_in(mut self, filter_in: Vec<(String, Vec<Value>)>) -> Self {
        self.filter_in = Some(filter_in);
        self
    }

    pub fn filter_expression(mut self, expression: FilterExpression) -> Self {
        self.filter_expression = Some(expression);
        self
    }

    pub fn filter_compound(mut self, compound: CompoundFilter) -> Self {
        self.filter_compound = Some(compound);
        self
    }

    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Builds the query definitions for one record kind.
pub trait ModelQuery: Send + Sync {
    /// Collection the definitions are executed against.
    fn collection_name(&self) -> &str;

    fn find_query(&self, request: &FindRequest) -> DocumentStoreResult<FindDefinition>;

    fn insert_query(&self, document: &Document) -> DocumentStoreResult<InsertDefinition>;

    fn insert_many_query(&self, documents: &[Document]) -> DocumentStoreResult<InsertManyDefinition>;

    fn update_query(&self, filter: &Document, document: &Document) -> DocumentStoreResult<UpdateDefinition>;

    /// One update per `(filter, document)` pair, in order.
    fn bulk_update_query(&self, entries: &[(Document, Document)]) -> DocumentStoreResult<BulkUpdateDefinition>;

    fn delete_query(&self, filter: &Document) -> DocumentStoreResult<DeleteDefinition>;
}

/// [`ModelQuery`] derived from a record's [`Schema`].
pub struct SchemaModelQuery<R> {
    _record: PhantomData<fn() -> R>,
}

impl<R> SchemaModelQuery<R> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<R> Default for SchemaModelQuery<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for SchemaModelQuery<R> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<R: Schema> fmt::Debug for SchemaModelQuery<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaModelQuery")
            .field("collection", &R::collection_name())
            .finish()
    }
}

impl<R: Schema> SchemaModelQuery<R> {
    fn with_insert(&self, builder: QueryBuilder, document: &Document, now: DateTime<Utc>) -> DocumentStoreResult<QueryBuilder> {
        let trimmed = with_id_first(trim(document, R::fields()));
        trace_dropped::<R>(document, &trimmed);

        let mut builder = builder.data_insert(&trimmed);

        for field in RESERVED_FIELDS {
            if let Some(stamp) = declared_stamp::<R>(document, field)? {
                builder = builder.add_insert_stamp(field, now, &stamp.id, &stamp.name);
            }
        }

        Ok(builder)
    }

    fn with_update(
        &self,
        builder: QueryBuilder,
        filter: &Document,
        document: &Document,
        now: DateTime<Utc>,
    ) -> DocumentStoreResult<QueryBuilder> {
        let trimmed = trim_excluding(document, R::fields(), &[ID_FIELD]);
        trace_dropped::<R>(document, &trimmed);

        let mut builder = builder.filter(filter).data_update(&trimmed);

        if let Some(stamp) = declared_stamp::<R>(document, MODIFIED_FIELD)? {
            builder = builder
                .add_update_date("modified.on", now)
                .add_update("modified.by._id", stamp.id)
                .add_update("modified.by.name", stamp.name);
        }

        Ok(builder)
    }
}

impl<R: Schema> ModelQuery for SchemaModelQuery<R> {
    fn collection_name(&self) -> &str {
        R::collection_name()
    }

    fn find_query(&self, request: &FindRequest) -> DocumentStoreResult<FindDefinition> {
        let mut builder = QueryBuilder::new();

        if let Some(query) = request.query.as_deref().filter(|query| !query.is_empty()) {
            builder = builder.query(query);
        } else if let Some((key, value)) = request.filter.as_ref().filter(|(key, _)| !key.is_empty()) {
            builder = builder.add_filter(key.as_str(), value.clone());
        } else if let Some(filters) = &request.filters {
            builder = builder.filter(filters);
        } else if let Some(filter_in) = &request.filter_in {
            builder = builder.filter_in(filter_in.clone());
        } else if let Some(expression) = &request.filter_expression {
            builder = builder.filter_expression(expression.clone());
        } else if let Some(compound) = &request.filter_compound {
            builder = builder.filter_compound(compound.clone());
        }

        builder = match &request.project {
            Some(fields) => builder.projection(fields.iter().cloned()),
            None => builder.project::<R>(),
        };

        if let Some(skip) = request.skip {
            builder = builder.skip(skip);
        }
        if let Some(limit) = request.limit {
            builder = builder.limit(limit);
        }

        builder.find_query()
    }

    fn insert_query(&self, document: &Document) -> DocumentStoreResult<InsertDefinition> {
        let builder = self.with_insert(QueryBuilder::new(), document, Utc::now())?;
        builder.insert_one_query()
    }

    fn insert_many_query(&self, documents: &[Document]) -> DocumentStoreResult<InsertManyDefinition> {
        let now = Utc::now();
        let mut builder = QueryBuilder::new();

        for document in documents {
            builder = self.with_insert(builder, document, now)?.add_to_insert_list();
        }

        builder.insert_many_query()
    }

    fn update_query(&self, filter: &Document, document: &Document) -> DocumentStoreResult<UpdateDefinition> {
        let builder = self.with_update(QueryBuilder::new(), filter, document, Utc::now())?;
        builder.update_one_query()
    }

    fn bulk_update_query(&self, entries: &[(Document, Document)]) -> DocumentStoreResult<BulkUpdateDefinition> {
        let now = Utc::now();
        let mut builder = QueryBuilder::new();

        for (filter, document) in entries {
            builder = self
                .with_update(builder, filter, document, now)?
                .add_to_bulk_update();
        }

        builder.bulk_update_query()
    }

    fn delete_query(&self, filter: &Document) -> DocumentStoreResult<DeleteDefinition> {
        QueryBuilder::new().filter(filter).delete_one_query()
    }
}

/// The author of an audit stamp, as supplied by the caller.
#[derive(Debug, Deserialize)]
struct StampRequest {
    #[serde(default)]
    by: Option<Author>,
}

#[derive(Debug, Default, Deserialize)]
struct Author {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

struct Stamp {
    id: String,
    name: String,
}

/// Reads the `{by: {_id, name}}` request for an audit field the record declares.
///
/// A stamp given as a JSON string is parsed first. A stamp without a non-empty
/// author id and name is rejected.
fn declared_stamp<R: Schema>(document: &Document, field: &str) -> DocumentStoreResult<Option<Stamp>> {
    if !R::declares(field) {
        return Ok(None);
    }

    let request = match document.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(json)) => serde_json::from_str::<StampRequest>(json)?,
        Some(value) => serde_json::from_value::<StampRequest>(value.clone())?,
    };

    let author = request.by.unwrap_or_default();
    match (author.id, author.name) {
        (Some(id), Some(name)) if !id.is_empty() && !name.is_empty() => Ok(Some(Stamp { id, name })),
        _ => Err(DocumentStoreError::InvalidDocument(format!(
            "`{field}` stamp of a {} record needs a `by._id` and a `by.name`",
            R::collection_name()
        ))),
    }
}

fn trace_dropped<R: Schema>(document: &Document, trimmed: &Document) {
    let dropped = document
        .keys()
        .filter(|key| !trimmed.contains_key(key.as_str()))
        .count();

    if dropped > 0 {
        trace!(
            collection = R::collection_name(),
            dropped,
            "dropped fields outside the record schema"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        definition::FilterDefinition,
        filter::{CombineMode, LogicalOperator},
    };
    use bson::{Bson, doc};
    use serde_json::json;

    struct Contact;

    impl Schema for Contact {
        fn collection_name() -> &'static str {
            "contacts"
        }

        fn fields() -> &'static [&'static str] {
            &["_id", "name", "email"]
        }
    }

    struct Item;

    impl Schema for Item {
        fn collection_name() -> &'static str {
            "items"
        }

        fn fields() -> &'static [&'static str] {
            &["_id", "name", "price", "created", "modified"]
        }
    }

    fn document(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn contacts() -> SchemaModelQuery<Contact> {
        SchemaModelQuery::new()
    }

    fn items() -> SchemaModelQuery<Item> {
        SchemaModelQuery::new()
    }

    #[test]
    fn find_uses_the_first_populated_tier() {
        let request = FindRequest::new()
            .filter_compound(CompoundFilter::new(LogicalOperator::And, vec![]))
            .filters(document(json!({ "name": "Alice" })))
            .filter("email", "a@x.com");

        let find = contacts().find_query(&request).unwrap();

        assert_eq!(find.filter, FilterDefinition::Document(doc! { "email": "a@x.com" }));
    }

    #[test]
    fn raw_query_wins_over_structured_filters() {
        let request = FindRequest::new()
            .filters(document(json!({ "name": "Alice" })))
            .query("{name:'Bob'}");

        let find = contacts().find_query(&request).unwrap();

        assert_eq!(find.filter, FilterDefinition::Raw("{name:'Bob'}".into()));
    }

    #[test]
    fn empty_query_and_blank_key_fall_through() {
        let request = FindRequest {
            query: Some(String::new()),
            filter: Some((String::new(), json!("ignored"))),
            filter_in: Some(vec![("name".into(), vec![json!("Alice"), json!("Bob")])]),
            ..FindRequest::default()
        };

        let find = contacts().find_query(&request).unwrap();

        assert_eq!(
            find.filter,
            FilterDefinition::Document(doc! { "name": { "$in": ["Alice", "Bob"] } })
        );
    }

    #[test]
    fn find_projects_declared_fields_by_default() {
        let default = contacts().find_query(&FindRequest::new()).unwrap();
        assert_eq!(default.projection, Some(doc! { "_id": 1, "name": 1, "email": 1 }));
        assert_eq!((default.skip, default.limit), (0, 1000));

        let explicit = contacts()
            .find_query(&FindRequest::new().project(["email"]).skip(5).limit(50))
            .unwrap();
        assert_eq!(explicit.projection, Some(doc! { "email": 1 }));
        assert_eq!((explicit.skip, explicit.limit), (5, 50));
    }

    #[test]
    fn where_in_combine_is_rejected_before_execution() {
        let request = FindRequest::new().filter_expression(FilterExpression::Combine(vec![(
            vec![document(json!({ "name": "Alice" }))],
            CombineMode::Where,
        )]));

        assert!(contacts().find_query(&request).unwrap_err().is_configuration());
    }

    #[test]
    fn insert_puts_a_generated_id_first_and_drops_undeclared_fields() {
        let insert = contacts()
            .insert_query(&document(json!({
                "name": "Alice",
                "nickname": "al",
                "email": "a@x.com",
            })))
            .unwrap();

        let keys = insert.document.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys, vec!["_id", "name", "email"]);

        let id = insert.document.get_str("_id").unwrap();
        assert_eq!(id.len(), 36);
        assert_eq!(id, id.to_uppercase());
    }

    #[test]
    fn insert_keeps_a_supplied_id() {
        let insert = contacts()
            .insert_query(&document(json!({ "email": "b@x.com", "_id": "C42" })))
            .unwrap();

        assert_eq!(insert.document, doc! { "_id": "C42", "email": "b@x.com" });
    }

    #[test]
    fn insert_stamps_declared_audit_fields() {
        let insert = items()
            .insert_query(&document(json!({
                "name": "bolt",
                "created": { "by": { "_id": "U1", "name": "admin" } },
                "modified": "{\"by\":{\"_id\":\"U1\",\"name\":\"admin\"}}",
            })))
            .unwrap();

        let created = insert.document.get_document("created").unwrap();
        assert!(matches!(created.get("on"), Some(Bson::DateTime(_))));
        assert_eq!(
            created.get_document("by").unwrap(),
            &doc! { "_id": "U1", "name": "admin" }
        );
        assert!(insert.document.get_document("modified").is_ok());
    }

    #[test]
    fn undeclared_audit_fields_are_ignored() {
        let insert = contacts()
            .insert_query(&document(json!({
                "_id": "C1",
                "created": { "by": { "_id": "U1", "name": "admin" } },
            })))
            .unwrap();

        assert_eq!(insert.document, doc! { "_id": "C1" });
    }

    #[test]
    fn insert_many_prepares_every_document() {
        let many = contacts()
            .insert_many_query(&[
                document(json!({ "_id": "A", "name": "Alice" })),
                document(json!({ "name": "Bob", "extra": true })),
            ])
            .unwrap();

        assert_eq!(many.documents.len(), 2);
        assert_eq!(many.documents[0], doc! { "_id": "A", "name": "Alice" });
        assert_eq!(
            many.documents[1].keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["_id", "name"]
        );
    }

    #[test]
    fn update_sets_trimmed_fields_without_touching_the_id() {
        let update = contacts()
            .update_query(
                &document(json!({ "_id": "C1" })),
                &document(json!({ "_id": "C2", "name": "Alicia", "age": 30 })),
            )
            .unwrap();

        assert_eq!(update.filter, doc! { "_id": "C1" });
        assert_eq!(update.update.to_document(), doc! { "$set": { "name": "Alicia" } });
    }

    #[test]
    fn update_refreshes_the_modified_stamp() {
        let update = items()
            .update_query(
                &document(json!({ "_id": "P1" })),
                &document(json!({
                    "price": 12.5,
                    "modified": { "by": { "_id": "U2", "name": "editor" } },
                })),
            )
            .unwrap()
            .update
            .to_document();

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_f64("price").unwrap(), 12.5);
        assert!(matches!(set.get("modified.on"), Some(Bson::DateTime(_))));
        assert_eq!(set.get_str("modified.by._id").unwrap(), "U2");
        assert_eq!(set.get_str("modified.by.name").unwrap(), "editor");
    }

    #[test]
    fn incomplete_modified_stamp_is_rejected() {
        let err = items()
            .update_query(
                &document(json!({ "_id": "P1" })),
                &document(json!({ "modified": { "by": { "_id": "U2" } } })),
            )
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[test]
    fn bulk_update_builds_one_entry_per_pair() {
        let bulk = contacts()
            .bulk_update_query(&[
                (document(json!({ "_id": "A" })), document(json!({ "name": "Ann" }))),
                (document(json!({ "_id": "B" })), document(json!({ "email": "b@x.com" }))),
            ])
            .unwrap();

        assert_eq!(bulk.entries.len(), 2);
        assert_eq!(bulk.entries[0].filter, doc! { "_id": "A" });
        assert_eq!(
            bulk.entries[1].update.to_document(),
            doc! { "$set": { "email": "b@x.com" } }
        );
    }

    #[test]
    fn delete_uses_the_filter_untrimmed() {
        let delete = contacts().delete_query(&document(json!({ "legacy_key": 7 }))).unwrap();

        assert_eq!(delete.filter, doc! { "legacy_key": 7 });
        assert_eq!(contacts().collection_name(), "contacts");
    }
}
