//! Filter evaluation for in-memory document matching.
//!
//! This module evaluates store-native filter documents against BSON documents,
//! following the matching rules of a document store shell: dotted paths reach into
//! nested documents and arrays, and an array field matches a value when any of its
//! elements does.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, DateTime, Document, oid::ObjectId};
use regex::{Regex, RegexBuilder};

use docgate_core::error::{DocumentStoreError, DocumentStoreResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64` so `1`, `1i64` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values without a defined ordering (binary data, regular expressions, ...).
    Opaque(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Opaque(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Opaque(a), Comparable::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Matches one document against filter documents.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` if the document satisfies every clause of `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidFilter`] for malformed or unsupported
    /// operators, including `$where`.
    pub fn matches(&self, filter: &Document) -> DocumentStoreResult<bool> {
        for (key, condition) in filter {
            if !self.matches_clause(key, condition)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn matches_clause(&self, key: &str, condition: &Bson) -> DocumentStoreResult<bool> {
        match key {
            "$and" => {
                for filter in sub_filters(key, condition)? {
                    if !self.matches(filter)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            "$or" => {
                for filter in sub_filters(key, condition)? {
                    if self.matches(filter)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            "$nor" => {
                for filter in sub_filters(key, condition)? {
                    if self.matches(filter)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            "$where" => Err(DocumentStoreError::InvalidFilter(
                "$where is not supported by the in-memory store".to_string(),
            )),
            operator if operator.starts_with('$') => Err(DocumentStoreError::InvalidFilter(format!(
                "unknown top-level operator {operator}"
            ))),
            path => self.matches_field(path, condition),
        }
    }

    fn matches_field(&self, path: &str, condition: &Bson) -> DocumentStoreResult<bool> {
        let values = lookup(self.document, path);

        match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                let options = operators.get_str("$options").unwrap_or_default();

                for (operator, operand) in operators {
                    let matched = match operator.as_str() {
                        "$eq" => equals_any(&values, operand),
                        "$ne" => !equals_any(&values, operand),
                        "$gt" => compares_any(&values, operand, |o| o == Ordering::Greater),
                        "$gte" => compares_any(&values, operand, |o| o != Ordering::Less),
                        "$lt" => compares_any(&values, operand, |o| o == Ordering::Less),
                        "$lte" => compares_any(&values, operand, |o| o != Ordering::Greater),
                        "$in" => in_any(&values, operator, operand)?,
                        "$nin" => !in_any(&values, operator, operand)?,
                        "$exists" => values.is_empty() != truthy(operand),
                        "$regex" => {
                            let regex = compile_regex(operand, options)?;
                            candidates(&values).any(|value| regex_matches(&regex, value))
                        }
                        "$options" if operators.contains_key("$regex") => true,
                        other => {
                            return Err(DocumentStoreError::InvalidFilter(format!(
                                "unsupported operator {other} on field {path}"
                            )));
                        }
                    };

                    if !matched {
                        return Ok(false);
                    }
                }

                Ok(true)
            }
            Bson::RegularExpression(_) => {
                let regex = compile_regex(condition, "")?;
                Ok(candidates(&values).any(|value| regex_matches(&regex, value)))
            }
            value => Ok(equals_any(&values, value)),
        }
    }
}

fn sub_filters<'b>(operator: &str, condition: &'b Bson) -> DocumentStoreResult<Vec<&'b Document>> {
    let invalid = || DocumentStoreError::InvalidFilter(format!("{operator} expects an array of documents"));

    match condition {
        Bson::Array(items) => items
            .iter()
            .map(|item| item.as_document().ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

fn is_operator_document(document: &Document) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}

/// Resolves a dotted path. Arrays along the way fan out over their document
/// elements unless the segment is a numeric index.
pub(crate) fn lookup<'b>(document: &'b Document, path: &str) -> Vec<&'b Bson> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut found = Vec::new();

    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            resolve(value, rest, &mut found);
        }
    }

    found
}

fn resolve<'b>(value: &'b Bson, segments: &[&str], found: &mut Vec<&'b Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(document) => {
            if let Some(next) = document.get(*head) {
                resolve(next, rest, found);
            }
        }
        Bson::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(item) = items.get(index) {
                    resolve(item, rest, found);
                }
            }
            Err(_) => {
                for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                    resolve(item, segments, found);
                }
            }
        },
        _ => {}
    }
}

/// Every value a condition is tested against: the resolved values and, for arrays,
/// their elements.
fn candidates<'b>(values: &'b [&'b Bson]) -> impl Iterator<Item = &'b Bson> {
    values.iter().flat_map(|value| {
        let elements: &[Bson] = match value {
            Bson::Array(items) => items.as_slice(),
            _ => &[],
        };
        std::iter::once(*value).chain(elements.iter())
    })
}

fn equals_any(values: &[&Bson], target: &Bson) -> bool {
    if values.is_empty() {
        return matches!(target, Bson::Null);
    }

    let target = Comparable::from(target);
    candidates(values).any(|value| Comparable::from(value) == target)
}

fn compares_any(values: &[&Bson], target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let target = Comparable::from(target);

    candidates(values).any(|value| {
        Comparable::from(value)
            .partial_cmp(&target)
            .is_some_and(&accept)
    })
}

fn in_any(values: &[&Bson], operator: &str, operand: &Bson) -> DocumentStoreResult<bool> {
    let Bson::Array(options) = operand else {
        return Err(DocumentStoreError::InvalidFilter(format!(
            "{operator} expects an array"
        )));
    };

    for option in options {
        let matched = match option {
            Bson::RegularExpression(_) => {
                let regex = compile_regex(option, "")?;
                candidates(values).any(|value| regex_matches(&regex, value))
            }
            other => equals_any(values, other),
        };

        if matched {
            return Ok(true);
        }
    }

    Ok(false)
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn regex_matches(regex: &Regex, value: &Bson) -> bool {
    matches!(value, Bson::String(s) if regex.is_match(s))
}

/// Compiles a pattern given as a string or a BSON regular expression. Flags of a
/// BSON regular expression are merged with `options`.
fn compile_regex(pattern: &Bson, options: &str) -> DocumentStoreResult<Regex> {
    let (pattern, flags) = match pattern {
        Bson::String(pattern) => (pattern.clone(), options.to_string()),
        Bson::RegularExpression(_) => {
            let (pattern, own) = regex_parts(pattern)?;
            (pattern, format!("{own}{options}"))
        }
        other => {
            return Err(DocumentStoreError::InvalidFilter(format!(
                "$regex expects a string or a regular expression, got {other}"
            )));
        }
    };

    RegexBuilder::new(&pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()
        .map_err(|err| DocumentStoreError::InvalidFilter(format!("invalid regular expression: {err}")))
}

fn regex_parts(regex: &Bson) -> DocumentStoreResult<(String, String)> {
    let json = regex.clone().into_relaxed_extjson();
    let parts = json.get("$regularExpression");
    let field = |name: &str| {
        parts
            .and_then(|parts| parts.get(name))
            .and_then(|value| value.as_str())
            .map(str::to_string)
    };

    match (field("pattern"), field("options")) {
        (Some(pattern), Some(options)) => Ok((pattern, options)),
        _ => Err(DocumentStoreError::InvalidFilter(format!(
            "unreadable regular expression {regex}"
        ))),
    }
}
