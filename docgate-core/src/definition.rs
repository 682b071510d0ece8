//! Immutable query definitions emitted by the [`QueryBuilder`](crate::builder::QueryBuilder).
//!
//! Each definition carries exactly the store-native pieces one operation kind needs.
//! Definitions are plain data: executing them is the [`Gateway`](crate::gateway::Gateway)'s job.

use bson::{Bson, Document, doc};

use crate::{error::DocumentStoreResult, literal::parse_filter};

/// Number of documents skipped by a find that does not ask otherwise.
pub const DEFAULT_SKIP: u64 = 0;

/// Upper bound on documents returned by a find that does not ask otherwise.
pub const DEFAULT_LIMIT: u64 = 1000;

/// A store filter: either a structured document or a raw literal still to be parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDefinition {
    /// A structured filter. The empty document places no constraint.
    Document(Document),
    /// A shell-style literal, parsed only when the query is executed.
    Raw(String),
}

impl FilterDefinition {
    /// A filter matching every document.
    pub fn match_all() -> Self {
        FilterDefinition::Document(Document::new())
    }

    /// Produces the structured document to hand to a store.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidFilter`](crate::error::DocumentStoreError::InvalidFilter)
    /// if a raw literal is malformed.
    pub fn resolve(&self) -> DocumentStoreResult<Document> {
        match self {
            FilterDefinition::Document(doc) => Ok(doc.clone()),
            FilterDefinition::Raw(query) => parse_filter(query),
        }
    }
}

impl Default for FilterDefinition {
    fn default() -> Self {
        FilterDefinition::match_all()
    }
}

impl From<Document> for FilterDefinition {
    fn from(doc: Document) -> Self {
        FilterDefinition::Document(doc)
    }
}

/// A single field-level update operation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Sets the field to the value.
    Set(String, Bson),
    /// Increments the field by the value.
    Inc(String, Bson),
    /// Appends every value to the array field.
    Push(String, Vec<Bson>),
}

/// An ordered list of update operations applied atomically to one matched document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOps(Vec<UpdateOp>);

impl UpdateOps {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, op: UpdateOp) {
        self.0.push(op);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpdateOp> {
        self.0.iter()
    }

    /// Merges the operations into a single update document.
    ///
    /// Later operations on the same field and operator replace earlier ones.
    pub fn to_document(&self) -> Document {
        let mut set = Document::new();
        let mut inc = Document::new();
        let mut push = Document::new();

        for op in &self.0 {
            match op {
                UpdateOp::Set(field, value) => {
                    set.insert(field.clone(), value.clone());
                }
                UpdateOp::Inc(field, value) => {
                    inc.insert(field.clone(), value.clone());
                }
                UpdateOp::Push(field, values) => {
                    push.insert(field.clone(), doc! { "$each": values.clone() });
                }
            }
        }

        let mut update = Document::new();
        for (operator, fields) in [("$set", set), ("$inc", inc), ("$push", push)] {
            if !fields.is_empty() {
                update.insert(operator, fields);
            }
        }

        update
    }
}

impl FromIterator<UpdateOp> for UpdateOps {
    fn from_iter<T: IntoIterator<Item = UpdateOp>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindDefinition {
    pub filter: FilterDefinition,
    /// Inclusion projection; `None` returns whole documents.
    pub projection: Option<Document>,
    pub skip: u64,
    pub limit: u64,
}

impl Default for FindDefinition {
    fn default() -> Self {
        Self {
            filter: FilterDefinition::match_all(),
            projection: None,
            skip: DEFAULT_SKIP,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertDefinition {
    pub document: Document,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyDefinition {
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDefinition {
    pub filter: Document,
    pub update: UpdateOps,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkUpdateDefinition {
    pub entries: Vec<UpdateDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteDefinition {
    pub filter: Document,
}

/// Any query definition, tagged by operation kind.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryDefinition {
    Find(FindDefinition),
    Insert(InsertDefinition),
    InsertMany(InsertManyDefinition),
    Update(UpdateDefinition),
    BulkUpdate(BulkUpdateDefinition),
    Delete(DeleteDefinition),
}

macro_rules! impl_from_definition {
    ($($variant:ident => $definition:ty),* $(,)?) => {
        $(
            impl From<$definition> for QueryDefinition {
                fn from(definition: $definition) -> Self {
                    QueryDefinition::$variant(definition)
                }
            }
        )*
    };
}

impl_from_definition! {
    Find => FindDefinition,
    Insert => InsertDefinition,
    InsertMany => InsertManyDefinition,
    Update => UpdateDefinition,
    BulkUpdate => BulkUpdateDefinition,
    Delete => DeleteDefinition,
}
