//! Store collaborator contract.

use crate::error::StoreResult;
use docweave_codec::{Document, DocumentId, Value, ID_FIELD};

/// How a store hands out identifiers for inserted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdAssignment {
    /// The store honours an `_id` supplied in the inserted document and
    /// generates one only when it is absent.
    ClientAllowed,
    /// The store always generates the identifier and rejects `_id` on insert.
    StoreGenerated,
}

/// A schemaless document store.
///
/// Stores are **opaque document containers**: they know collections and
/// identifiers but nothing about schemas, embedding or references.
///
/// # Invariants
///
/// - `insert` returns the identifier the document is stored under
/// - `find_by_id` returns exactly the document last written under that id,
///   including its `_id` field
/// - Every call is independent; there is no multi-document atomicity
/// - Stores must be `Send + Sync`
pub trait DocumentStore: Send + Sync {
    /// Inserts a document and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the supplied `_id` is taken or rejected.
    fn insert(&self, collection: &str, document: Document) -> StoreResult<DocumentId>;

    /// Replaces the document stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such document exists.
    fn replace(&self, collection: &str, id: DocumentId, document: Document) -> StoreResult<()>;

    /// Deletes the document stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such document exists.
    fn delete(&self, collection: &str, id: DocumentId) -> StoreResult<()>;

    /// Returns the first document (in insertion order) matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    /// Returns the document stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_by_id(&self, collection: &str, id: DocumentId) -> StoreResult<Option<Document>> {
        self.find_one(collection, &Filter::by_id(id))
    }

    /// The identifier assignment contract of this store.
    fn id_assignment(&self) -> IdAssignment;
}

/// A conjunction of top-level field equalities.
///
/// An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Creates a filter matching every document.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a filter on the `_id` field.
    #[must_use]
    pub fn by_id(id: DocumentId) -> Self {
        Self::all().eq(ID_FIELD, id)
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Returns true if `document` satisfies every condition.
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }

    /// The identifier this filter pins, if any.
    pub fn pinned_id(&self) -> Option<DocumentId> {
        self.conditions
            .iter()
            .find(|(field, _)| field == ID_FIELD)
            .and_then(|(_, value)| value.as_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::all().matches(&Document::new()));
    }

    #[test]
    fn equality_conditions_are_conjunctive() {
        let doc = Document::new().with("name", "Root").with("rank", 1);
        assert!(Filter::all().eq("name", "Root").matches(&doc));
        assert!(Filter::all().eq("name", "Root").eq("rank", 1).matches(&doc));
        assert!(!Filter::all().eq("name", "Root").eq("rank", 2).matches(&doc));
        assert!(!Filter::all().eq("missing", Value::Null).matches(&doc));
    }

    #[test]
    fn by_id_pins_identifier() {
        let id = DocumentId::new();
        let filter = Filter::by_id(id);
        assert_eq!(filter.pinned_id(), Some(id));
        assert!(filter.matches(&Document::new().with(ID_FIELD, id)));
        assert_eq!(Filter::all().eq("name", "x").pinned_id(), None);
    }
}
