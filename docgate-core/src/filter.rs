//! The query algebra: filter expressions and their rendering.
//!
//! A [`FilterExpression`] is a tagged description of which documents a read or delete
//! should select. Every typed variant renders straight into a store-native BSON
//! filter with [`FilterExpression::to_filter`]; only [`FilterExpression::Raw`] stays a
//! string, to be parsed at the store boundary.
//!
//! Rendering never fails for empty input. Variants with nothing to match on render
//! to `None`, which callers treat as "no constraint", not "match nothing".
//!
//! # Example
//!
//! ```ignore
//! use docgate_core::filter::FilterExpression;
//! use serde_json::json;
//!
//! let expr = FilterExpression::OrIn(vec![
//!     json!({ "status": "active" }).as_object().unwrap().clone(),
//!     json!({ "status": "trial" }).as_object().unwrap().clone(),
//! ]);
//!
//! // { "$or": [ { "status": { "$in": ["active", "trial"] } } ] }
//! let filter = expr.to_filter()?;
//! ```

use bson::{Bson, doc};
use serde::{Deserialize, Serialize};

use crate::{
    definition::FilterDefinition,
    error::{DocumentStoreError, DocumentStoreResult},
    literal::{is_bare_key, parse_value},
    value::{Document, Value, to_bson, to_bson_document},
};

/// How one entry of a [`FilterExpression::Combine`] renders its group of documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineMode {
    /// Each document becomes its own conjunctive clause.
    Or,
    /// Values are grouped by field into `$in` clauses.
    OrIn,
    /// Like [`CombineMode::OrIn`], with values taken as regular-expression literals.
    OrInRegex,
    /// Not supported; selecting it is a configuration error.
    Where,
}

/// A filter expression describing which documents to select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpression {
    /// Conjunction of exact-equality pairs.
    And(Document),
    /// Disjunction of conjunctive equality groups.
    Or(Vec<Document>),
    /// Values merged per field across all documents, one `$in` clause per field.
    OrIn(Vec<Document>),
    /// Same grouping as [`FilterExpression::OrIn`]; string values are
    /// `/pattern/flags` regular-expression literals.
    OrInRegex(Vec<Document>),
    /// Each pair becomes its own single-field equality clause.
    OrCommon(Vec<(String, Value)>),
    /// Several groups, each rendered by its [`CombineMode`], unioned into one `$or`.
    Combine(Vec<(Vec<Document>, CombineMode)>),
    /// An already-rendered filter literal, passed through unvalidated.
    Raw(String),
    /// Legacy server-side predicate. Never rendered.
    Where(Vec<Document>),
}

impl FilterExpression {
    /// Renders this expression into a store filter.
    ///
    /// Returns `Ok(None)` when the expression places no constraint on the result.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] for [`FilterExpression::Where`],
    /// standalone or inside a [`FilterExpression::Combine`].
    pub fn to_filter(&self) -> DocumentStoreResult<Option<FilterDefinition>> {
        let document = match self {
            FilterExpression::And(pairs) => {
                (!pairs.is_empty()).then(|| to_bson_document(pairs)).transpose()?
            }
            FilterExpression::Or(groups) => union(or_clauses(groups)?),
            FilterExpression::OrIn(groups) => union(in_clauses(groups, to_bson)?),
            FilterExpression::OrInRegex(groups) => union(in_clauses(groups, regex_value)?),
            FilterExpression::OrCommon(pairs) => union(common_clauses(pairs)?),
            FilterExpression::Combine(entries) => {
                let mut clauses = Vec::new();

                for (groups, mode) in entries {
                    match mode {
                        CombineMode::Or => clauses.extend(or_clauses(groups)?),
                        CombineMode::OrIn => clauses.extend(in_clauses(groups, to_bson)?),
                        CombineMode::OrInRegex => clauses.extend(in_clauses(groups, regex_value)?),
                        CombineMode::Where => return Err(where_unsupported()),
                    }
                }

                union(clauses)
            }
            FilterExpression::Raw(query) => {
                return Ok(Some(FilterDefinition::Raw(query.clone())));
            }
            FilterExpression::Where(_) => return Err(where_unsupported()),
        };

        Ok(document.map(FilterDefinition::Document))
    }

    /// Renders this expression in the shell-style literal syntax.
    ///
    /// Booleans are bare lowercase tokens, strings are single-quoted and every
    /// other value is bare. Regular-expression values of
    /// [`FilterExpression::OrInRegex`] are embedded unquoted.
    ///
    /// # Errors
    ///
    /// Fails exactly where [`FilterExpression::to_filter`] does.
    pub fn render(&self) -> DocumentStoreResult<Option<String>> {
        let rendered = match self {
            FilterExpression::And(pairs) => (!pairs.is_empty()).then(|| render_document(pairs)),
            FilterExpression::Or(groups) => render_union(groups.iter().map(render_document).collect()),
            FilterExpression::OrIn(groups) => render_union(render_in_clauses(groups, render_value)),
            FilterExpression::OrInRegex(groups) => {
                render_union(render_in_clauses(groups, render_regex_value))
            }
            FilterExpression::OrCommon(pairs) => render_union(
                pairs
                    .iter()
                    .map(|(key, value)| format!("{{{}:{}}}", render_key(key), render_value(value)))
                    .collect(),
            ),
            FilterExpression::Combine(entries) => {
                let mut clauses = Vec::new();

                for (groups, mode) in entries {
                    match mode {
                        CombineMode::Or => clauses.extend(groups.iter().map(render_document)),
                        CombineMode::OrIn => clauses.extend(render_in_clauses(groups, render_value)),
                        CombineMode::OrInRegex => {
                            clauses.extend(render_in_clauses(groups, render_regex_value))
                        }
                        CombineMode::Where => return Err(where_unsupported()),
                    }
                }

                render_union(clauses)
            }
            FilterExpression::Raw(query) => Some(query.clone()),
            FilterExpression::Where(_) => return Err(where_unsupported()),
        };

        Ok(rendered)
    }
}

/// The logical operator joining the expressions of a [`CompoundFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "$and",
            LogicalOperator::Or => "$or",
        }
    }
}

/// Several filter expressions joined by one logical operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundFilter {
    pub operator: LogicalOperator,
    pub expressions: Vec<FilterExpression>,
}

impl CompoundFilter {
    pub fn new(operator: LogicalOperator, expressions: Vec<FilterExpression>) -> Self {
        Self { operator, expressions }
    }

    /// Renders every expression and joins the results with the operator.
    ///
    /// Expressions without a constraint are skipped. If any member is a raw literal
    /// the whole compound stays a raw literal, since raw text is only parsed at the
    /// store boundary.
    pub fn to_filter(&self) -> DocumentStoreResult<Option<FilterDefinition>> {
        let rendered = self
            .expressions
            .iter()
            .filter_map(|expr| expr.to_filter().transpose())
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        if rendered.is_empty() {
            return Ok(None);
        }

        if rendered.iter().all(|filter| matches!(filter, FilterDefinition::Document(_))) {
            let clauses = rendered
                .into_iter()
                .filter_map(|filter| match filter {
                    FilterDefinition::Document(doc) => Some(Bson::Document(doc)),
                    FilterDefinition::Raw(_) => None,
                })
                .collect::<Vec<_>>();

            return Ok(Some(FilterDefinition::Document(doc! { self.operator.as_str(): clauses })));
        }

        let literals = self
            .expressions
            .iter()
            .filter_map(|expr| expr.render().transpose())
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        Ok(Some(FilterDefinition::Raw(format!(
            "{{{}:[{}]}}",
            self.operator.as_str(),
            literals.join(",")
        ))))
    }
}

fn where_unsupported() -> DocumentStoreError {
    DocumentStoreError::Configuration("Where filters are not supported".to_string())
}

fn union(clauses: Vec<Bson>) -> Option<bson::Document> {
    (!clauses.is_empty()).then(|| doc! { "$or": clauses })
}

fn or_clauses(groups: &[Document]) -> DocumentStoreResult<Vec<Bson>> {
    groups
        .iter()
        .map(|group| to_bson_document(group).map(Bson::Document))
        .collect()
}

fn common_clauses(pairs: &[(String, Value)]) -> DocumentStoreResult<Vec<Bson>> {
    pairs
        .iter()
        .map(|(key, value)| {
            let value = to_bson(value)?;
            Ok(Bson::Document(doc! { key.as_str(): value }))
        })
        .collect()
}

/// Groups every value of every document by field name, keeping first-seen field order.
fn group_by_field(groups: &[Document]) -> Vec<(&str, Vec<&Value>)> {
    let mut fields: Vec<(&str, Vec<&Value>)> = Vec::new();

    for (key, value) in groups.iter().flat_map(|group| group.iter()) {
        match fields.iter_mut().find(|(field, _)| *field == key.as_str()) {
            Some((_, values)) => values.push(value),
            None => fields.push((key.as_str(), vec![value])),
        }
    }

    fields
}

fn in_clauses(
    groups: &[Document],
    convert: fn(&Value) -> DocumentStoreResult<Bson>,
) -> DocumentStoreResult<Vec<Bson>> {
    group_by_field(groups)
        .into_iter()
        .map(|(field, values)| {
            let values = values
                .into_iter()
                .map(convert)
                .collect::<DocumentStoreResult<Vec<_>>>()?;
            Ok(Bson::Document(doc! { field: { "$in": values } }))
        })
        .collect()
}

/// Reads `/pattern/flags` strings as regular expressions; anything else converts as-is.
fn regex_value(value: &Value) -> DocumentStoreResult<Bson> {
    if let Value::String(literal) = value {
        if literal.starts_with('/') {
            if let Ok(regex @ Bson::RegularExpression(_)) = parse_value(literal) {
                return Ok(regex);
            }
        }
    }

    to_bson(value)
}

fn render_union(clauses: Vec<String>) -> Option<String> {
    (!clauses.is_empty()).then(|| format!("{{$or:[{}]}}", clauses.join(",")))
}

fn render_in_clauses(groups: &[Document], render: fn(&Value) -> String) -> Vec<String> {
    group_by_field(groups)
        .into_iter()
        .map(|(field, values)| {
            let values = values.into_iter().map(render).collect::<Vec<_>>();
            format!("{{{}:{{$in:[{}]}}}}", render_key(field), values.join(","))
        })
        .collect()
}

fn render_key(key: &str) -> String {
    if is_bare_key(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn render_document(document: &Document) -> String {
    let pairs = document
        .iter()
        .map(|(key, value)| format!("{}:{}", render_key(key), render_value(value)))
        .collect::<Vec<_>>();

    format!("{{{}}}", pairs.join(","))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(render_value).collect::<Vec<_>>().join(",")
        ),
        Value::Object(map) => render_document(map),
    }
}

fn render_regex_value(value: &Value) -> String {
    match value {
        Value::String(literal) => literal.clone(),
        other => render_value(other),
    }
}
