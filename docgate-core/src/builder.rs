//! The document query builder.
//!
//! [`QueryBuilder`] is a single-use accumulator. Configuration calls fill its filter,
//! projection, insert and update slots, and one terminal call consumes the builder
//! and emits an immutable definition from the slots that operation kind reads. Slots
//! the terminal call does not read are ignored, not validated.
//!
//! # Filter precedence
//!
//! A find uses exactly one filter source, the first one populated in this order:
//!
//! 1. the raw query string ([`QueryBuilder::query`])
//! 2. the equality map ([`QueryBuilder::add_filter`], [`QueryBuilder::filter`])
//! 3. the `$in` map ([`QueryBuilder::add_filter_in`], [`QueryBuilder::filter_in`])
//! 4. a single [`FilterExpression`]
//! 5. a [`CompoundFilter`]
//!
//! # Bulk updates
//!
//! [`QueryBuilder::add_to_bulk_update`] moves the current equality map and update
//! operations into a bulk entry and resets both, so one builder can describe many
//! independent updates:
//!
//! ```ignore
//! let bulk = QueryBuilder::new()
//!     .add_filter("_id", "A")
//!     .add_update("status", "shipped")
//!     .add_to_bulk_update()
//!     .add_filter("_id", "B")
//!     .add_update_inc("retries", 1)
//!     .add_to_bulk_update()
//!     .bulk_update_query()?;
//!
//! assert_eq!(bulk.entries.len(), 2);
//! ```
//!
//! # Unrepresentable values
//!
//! Chained setters stay infallible. A value BSON cannot hold (an unsigned integer
//! above `i64::MAX`) is left out of its slot, and the first terminal call reading
//! that slot returns [`DocumentStoreError::InvalidDocument`].

use bson::{Bson, DateTime, doc, ser::serialize_to_bson};
use chrono::Utc;
use serde::Serialize;
use tracing::trace;

use crate::{
    definition::{
        BulkUpdateDefinition, DEFAULT_LIMIT, DEFAULT_SKIP, DeleteDefinition, FilterDefinition,
        FindDefinition, InsertDefinition, InsertManyDefinition, UpdateDefinition, UpdateOp,
        UpdateOps,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{CompoundFilter, FilterExpression},
    schema::Schema,
    value::{Document, Value, json_document, to_bson, to_bson_document},
};

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: Option<String>,
    filters: bson::Document,
    filter_in: Vec<(String, Vec<Bson>)>,
    expression: Option<FilterExpression>,
    compound: Option<CompoundFilter>,

    projections: Vec<String>,
    schema_projection: Vec<String>,
    skip: u64,
    limit: u64,

    insert: Option<bson::Document>,
    insert_many: Vec<bson::Document>,

    update: UpdateOps,
    bulk_update: Vec<UpdateDefinition>,

    rejected_filter: Option<String>,
    rejected_insert: Option<String>,
    rejected_update: Option<String>,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryBuilder {
    /// Creates an empty builder. Finds default to `skip = 0` and `limit = 1000`.
    pub fn new() -> Self {
        Self {
            query: None,
            filters: bson::Document::new(),
            filter_in: Vec::new(),
            expression: None,
            compound: None,
            projections: Vec::new(),
            schema_projection: Vec::new(),
            skip: DEFAULT_SKIP,
            limit: DEFAULT_LIMIT,
            insert: None,
            insert_many: Vec::new(),
            update: UpdateOps::new(),
            bulk_update: Vec::new(),
            rejected_filter: None,
            rejected_insert: None,
            rejected_update: None,
        }
    }

    /// Sets a raw filter literal, which outranks every other filter source.
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Adds one equality pair to the equality map.
    pub fn add_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Some(value) = accept(&mut self.rejected_filter, to_bson(&value.into())) {
            self.filters.insert(key.into(), value);
        }
        self
    }

    /// Replaces the equality map.
    pub fn filter(mut self, filter: &Document) -> Self {
        self.filters = accept(&mut self.rejected_filter, to_bson_document(filter)).unwrap_or_default();
        self
    }

    /// Adds one field whose value must be among `values`.
    pub fn add_filter_in(mut self, key: impl Into<String>, values: Vec<Value>) -> Self {
        if let Some(values) = accept(&mut self.rejected_filter, bson_values(&values)) {
            self.filter_in.push((key.into(), values));
        }
        self
    }

    /// Replaces the `$in` map. Every field must match one of its values.
    pub fn filter_in(mut self, filter_in: Vec<(String, Vec<Value>)>) -> Self {
        self.filter_in.clear();
        for (key, values) in filter_in {
            self = self.add_filter_in(key, values);
        }
        self
    }

    /// Sets a single filter expression, rendered when the find is emitted.
    pub fn filter_expression(mut self, expression: FilterExpression) -> Self {
        self.expression = Some(expression);
        self
    }

    /// Sets a compound filter, the lowest-precedence filter source.
    pub fn filter_compound(mut self, compound: CompoundFilter) -> Self {
        self.compound = Some(compound);
        self
    }

    pub fn add_projection(mut self, field: impl Into<String>) -> Self {
        self.projections.push(field.into());
        self
    }

    /// Replaces the explicit projection list.
    pub fn projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projections = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Projects every field declared by `R`. An explicit projection list still wins.
    pub fn project<R: Schema>(mut self) -> Self {
        self.schema_projection = R::fields().iter().map(|field| field.to_string()).collect();
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Replaces the pending insert document.
    pub fn data_insert(mut self, document: &Document) -> Self {
        self.insert = accept(&mut self.rejected_insert, to_bson_document(document));
        self
    }

    /// Replaces the pending insert document with a parsed JSON object.
    pub fn data_insert_json(mut self, json: &str) -> DocumentStoreResult<Self> {
        self.insert = Some(json_document(&Value::String(json.to_string()))?);
        Ok(self)
    }

    /// Replaces the pending insert document with any serializable value.
    pub fn data_insert_from<T: Serialize>(mut self, value: &T) -> DocumentStoreResult<Self> {
        match serialize_to_bson(value)? {
            Bson::Document(document) => {
                self.insert = Some(document);
                Ok(self)
            }
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "expected a document, got {other}"
            ))),
        }
    }

    /// Appends a scalar field to the pending insert document.
    pub fn add_insert(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        match accept(&mut self.rejected_insert, to_bson(&value.into())) {
            Some(value) => self.push_insert(key.into(), value),
            None => self,
        }
    }

    pub fn add_insert_date(self, key: impl Into<String>, on: chrono::DateTime<Utc>) -> Self {
        self.push_insert(key.into(), Bson::DateTime(DateTime::from_chrono(on)))
    }

    /// Appends an audit stamp `{on, by: {_id, name}}` to the pending insert document.
    pub fn add_insert_stamp(
        self,
        key: impl Into<String>,
        on: chrono::DateTime<Utc>,
        by_id: &str,
        by_name: &str,
    ) -> Self {
        let stamp = doc! {
            "on": DateTime::from_chrono(on),
            "by": { "_id": by_id, "name": by_name },
        };

        self.push_insert(key.into(), Bson::Document(stamp))
    }

    /// Appends an array field.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if `value` is not a sequence.
    pub fn add_insert_array(self, key: impl Into<String>, value: Value) -> DocumentStoreResult<Self> {
        let key = key.into();
        let array = cast_to_array(&key, &value)?;
        Ok(self.push_insert(key, array))
    }

    /// Appends a nested document given as an object or a JSON string.
    pub fn add_insert_json(self, key: impl Into<String>, value: &Value) -> DocumentStoreResult<Self> {
        let document = json_document(value)?;
        Ok(self.push_insert(key.into(), Bson::Document(document)))
    }

    /// Appends a list of nested documents, each an object or a JSON string.
    pub fn add_insert_json_list(self, key: impl Into<String>, value: Value) -> DocumentStoreResult<Self> {
        let key = key.into();
        let documents = cast_to_documents(&key, &value)?;
        Ok(self.push_insert(key, Bson::Array(documents)))
    }

    /// Moves the pending insert document into the insert-many batch.
    pub fn add_to_insert_list(mut self) -> Self {
        if let Some(document) = self.insert.take() {
            self.insert_many.push(document);
        }
        self
    }

    /// Appends a document straight to the insert-many batch.
    pub fn add_doc_insert(mut self, document: &Document) -> Self {
        if let Some(document) = accept(&mut self.rejected_insert, to_bson_document(document)) {
            self.insert_many.push(document);
        }
        self
    }

    /// Adds a set operation for every field of `document`.
    pub fn data_update(mut self, document: &Document) -> Self {
        for (key, value) in document {
            self = self.add_update(key.as_str(), value.clone());
        }
        self
    }

    pub fn add_update(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Some(value) = accept(&mut self.rejected_update, to_bson(&value.into())) {
            self.update.push(UpdateOp::Set(key.into(), value));
        }
        self
    }

    pub fn add_update_date(mut self, key: impl Into<String>, on: chrono::DateTime<Utc>) -> Self {
        self.update
            .push(UpdateOp::Set(key.into(), Bson::DateTime(DateTime::from_chrono(on))));
        self
    }

    pub fn add_update_inc(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Some(value) = accept(&mut self.rejected_update, to_bson(&value.into())) {
            self.update.push(UpdateOp::Inc(key.into(), value));
        }
        self
    }

    /// Pushes every document of a list onto an array field.
    pub fn add_update_push(mut self, key: impl Into<String>, value: Value) -> DocumentStoreResult<Self> {
        let key = key.into();
        let documents = cast_to_documents(&key, &value)?;
        self.update.push(UpdateOp::Push(key, documents));
        Ok(self)
    }

    pub fn add_update_json(mut self, key: impl Into<String>, value: &Value) -> DocumentStoreResult<Self> {
        let document = json_document(value)?;
        self.update
            .push(UpdateOp::Set(key.into(), Bson::Document(document)));
        Ok(self)
    }

    pub fn add_update_json_list(mut self, key: impl Into<String>, value: Value) -> DocumentStoreResult<Self> {
        let key = key.into();
        let documents = cast_to_documents(&key, &value)?;
        self.update.push(UpdateOp::Set(key, Bson::Array(documents)));
        Ok(self)
    }

    /// Sets an array field.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if `value` is not a sequence.
    pub fn add_update_array(mut self, key: impl Into<String>, value: Value) -> DocumentStoreResult<Self> {
        let key = key.into();
        let array = cast_to_array(&key, &value)?;
        self.update.push(UpdateOp::Set(key, array));
        Ok(self)
    }

    /// Moves the current equality map and update operations into a bulk entry,
    /// leaving both empty for the next entry. A rejected value stays on record
    /// and fails the bulk update.
    pub fn add_to_bulk_update(mut self) -> Self {
        self.bulk_update.push(UpdateDefinition {
            filter: std::mem::take(&mut self.filters),
            update: std::mem::take(&mut self.update),
        });
        self
    }

    /// The equality map accumulated so far.
    pub fn pending_filter(&self) -> &bson::Document {
        &self.filters
    }

    /// The update operations accumulated so far.
    pub fn pending_update(&self) -> &UpdateOps {
        &self.update
    }

    /// Emits a find definition.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if the selected filter source is a
    /// `Where` expression or contains one, and [`DocumentStoreError::InvalidDocument`]
    /// if a filter value was rejected.
    pub fn find_query(self) -> DocumentStoreResult<FindDefinition> {
        check(&self.rejected_filter)?;
        let filter = self.resolve_filter()?;

        let projection = if !self.projections.is_empty() {
            Some(inclusion(&self.projections))
        } else if !self.schema_projection.is_empty() {
            Some(inclusion(&self.schema_projection))
        } else {
            None
        };

        Ok(FindDefinition {
            filter,
            projection,
            skip: self.skip,
            limit: self.limit,
        })
    }

    /// Emits an insert of the pending insert document (empty if none was set).
    pub fn insert_one_query(self) -> DocumentStoreResult<InsertDefinition> {
        check(&self.rejected_insert)?;
        Ok(InsertDefinition {
            document: self.insert.unwrap_or_default(),
        })
    }

    pub fn insert_many_query(self) -> DocumentStoreResult<InsertManyDefinition> {
        check(&self.rejected_insert)?;
        Ok(InsertManyDefinition {
            documents: self.insert_many,
        })
    }

    /// Emits an update of the documents matching the equality map.
    pub fn update_one_query(self) -> DocumentStoreResult<UpdateDefinition> {
        check(&self.rejected_filter)?;
        check(&self.rejected_update)?;
        Ok(UpdateDefinition {
            filter: self.filters,
            update: self.update,
        })
    }

    pub fn bulk_update_query(self) -> DocumentStoreResult<BulkUpdateDefinition> {
        check(&self.rejected_filter)?;
        check(&self.rejected_update)?;
        Ok(BulkUpdateDefinition {
            entries: self.bulk_update,
        })
    }

    /// Emits a delete of the first document matching the equality map.
    pub fn delete_one_query(self) -> DocumentStoreResult<DeleteDefinition> {
        check(&self.rejected_filter)?;
        Ok(DeleteDefinition {
            filter: self.filters,
        })
    }

    fn push_insert(mut self, key: String, value: Bson) -> Self {
        self.insert
            .get_or_insert_with(bson::Document::new)
            .insert(key, value);
        self
    }

    fn resolve_filter(&self) -> DocumentStoreResult<FilterDefinition> {
        if let Some(query) = &self.query {
            self.trace_ignored("raw query");
            return Ok(FilterDefinition::Raw(query.clone()));
        }

        if !self.filters.is_empty() {
            self.trace_ignored("equality map");
            return Ok(FilterDefinition::Document(self.filters.clone()));
        }

        if !self.filter_in.is_empty() {
            self.trace_ignored("$in map");
            let filter = self
                .filter_in
                .iter()
                .map(|(key, values)| (key.clone(), Bson::Document(doc! { "$in": values.clone() })))
                .collect();
            return Ok(FilterDefinition::Document(filter));
        }

        if let Some(expression) = &self.expression {
            if self.compound.is_some() {
                trace!(selected = "expression", "ignoring compound filter");
            }
            return Ok(expression.to_filter()?.unwrap_or_default());
        }

        if let Some(compound) = &self.compound {
            return Ok(compound.to_filter()?.unwrap_or_default());
        }

        Ok(FilterDefinition::match_all())
    }

    fn trace_ignored(&self, selected: &str) {
        if self.expression.is_some() || self.compound.is_some() {
            trace!(selected, "ignoring lower-precedence filter expressions");
        }
    }
}

/// Records the first conversion failure of a slot and drops the value.
fn accept<T>(rejected: &mut Option<String>, converted: DocumentStoreResult<T>) -> Option<T> {
    match converted {
        Ok(value) => Some(value),
        Err(err) => {
            if rejected.is_none() {
                *rejected = Some(match err {
                    DocumentStoreError::InvalidDocument(reason) => reason,
                    other => other.to_string(),
                });
            }
            None
        }
    }
}

fn check(rejected: &Option<String>) -> DocumentStoreResult<()> {
    match rejected {
        Some(reason) => Err(DocumentStoreError::InvalidDocument(reason.clone())),
        None => Ok(()),
    }
}

fn bson_values(values: &[Value]) -> DocumentStoreResult<Vec<Bson>> {
    values.iter().map(to_bson).collect()
}

fn inclusion(fields: &[String]) -> bson::Document {
    fields
        .iter()
        .map(|field| (field.clone(), Bson::Int32(1)))
        .collect()
}

fn cast_to_array(key: &str, value: &Value) -> DocumentStoreResult<Bson> {
    match value {
        Value::Array(_) => to_bson(value),
        other => Err(DocumentStoreError::Configuration(format!(
            "field `{key}` expects a sequence, got {other}"
        ))),
    }
}

fn cast_to_documents(key: &str, value: &Value) -> DocumentStoreResult<Vec<Bson>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| json_document(item).map(Bson::Document))
            .collect(),
        other => Err(DocumentStoreError::Configuration(format!(
            "field `{key}` expects a list of documents, got {other}"
        ))),
    }
}
