//! In-memory document store.

use crate::error::{StoreError, StoreResult};
use crate::store::{DocumentStore, Filter, IdAssignment};
use docweave_codec::{from_cbor, to_canonical_cbor, Document, DocumentId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::trace;

/// Kind of write recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// A document was inserted.
    Insert,
    /// A document was replaced.
    Replace,
    /// A document was deleted.
    Delete,
}

/// One applied write, as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Kind of write.
    pub kind: WriteKind,
    /// Target collection.
    pub collection: String,
    /// Target document.
    pub id: DocumentId,
}

#[derive(Debug)]
struct StoredDocument {
    id: DocumentId,
    bytes: Vec<u8>,
}

/// An in-memory document store.
///
/// Documents are held as canonical CBOR bytes, so every read decodes a
/// fresh copy and nothing written can alias caller memory. Collections keep
/// insertion order, which `find_one` follows.
///
/// Suitable for:
/// - Unit and integration tests
/// - Ephemeral sessions that don't need persistence
///
/// # Example
///
/// ```rust
/// use docweave_codec::Document;
/// use docweave_store::{DocumentStore, Filter, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// let id = store.insert("orders", Document::new().with("title", "Order")).unwrap();
/// let found = store.find_one("orders", &Filter::all()).unwrap().unwrap();
/// assert_eq!(found.id(), Some(id));
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<StoredDocument>>>,
    journal: Mutex<Vec<JournalEntry>>,
    id_assignment: IdAssignment,
}

impl InMemoryStore {
    /// Creates an empty store that accepts client identifiers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id_assignment(IdAssignment::ClientAllowed)
    }

    /// Creates an empty store with the given identifier contract.
    #[must_use]
    pub fn with_id_assignment(id_assignment: IdAssignment) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            journal: Mutex::new(Vec::new()),
            id_assignment,
        }
    }

    /// Returns a copy of every applied write, oldest first.
    #[must_use]
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().clone()
    }

    /// Returns the applied writes that targeted `collection`.
    #[must_use]
    pub fn journal_for(&self, collection: &str) -> Vec<JournalEntry> {
        self.journal
            .lock()
            .iter()
            .filter(|entry| entry.collection == collection)
            .cloned()
            .collect()
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, Vec::len)
    }

    /// All documents of a collection, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if stored bytes fail to decode.
    pub fn documents(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();
        collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|stored| from_cbor(&stored.bytes).map_err(StoreError::from))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Raw stored bytes of one document.
    #[must_use]
    pub fn raw_bytes(&self, collection: &str, id: DocumentId) -> Option<Vec<u8>> {
        self.collections
            .read()
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .map(|d| d.bytes.clone())
    }

    /// Removes every document and journal entry.
    pub fn clear(&self) {
        self.collections.write().clear();
        self.journal.lock().clear();
    }

    fn record(&self, kind: WriteKind, collection: &str, id: DocumentId) {
        trace!(?kind, collection, %id, "store write");
        self.journal.lock().push(JournalEntry {
            kind,
            collection: collection.to_string(),
            id,
        });
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryStore {
    fn insert(&self, collection: &str, mut document: Document) -> StoreResult<DocumentId> {
        let id = match (document.id(), self.id_assignment) {
            (Some(_), IdAssignment::StoreGenerated) => {
                return Err(StoreError::ClientIdRejected {
                    collection: collection.to_string(),
                });
            }
            (Some(id), IdAssignment::ClientAllowed) => id,
            (None, _) => {
                let id = DocumentId::new();
                document.set_id(id);
                id
            }
        };

        let bytes = to_canonical_cbor(&document);
        {
            let mut collections = self.collections.write();
            let docs = collections.entry(collection.to_string()).or_default();
            if docs.iter().any(|d| d.id == id) {
                return Err(StoreError::DuplicateId {
                    collection: collection.to_string(),
                    id,
                });
            }
            docs.push(StoredDocument { id, bytes });
        }
        self.record(WriteKind::Insert, collection, id);
        Ok(id)
    }

    fn replace(&self, collection: &str, id: DocumentId, mut document: Document) -> StoreResult<()> {
        document.set_id(id);
        let bytes = to_canonical_cbor(&document);
        {
            let mut collections = self.collections.write();
            let stored = collections
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            stored.bytes = bytes;
        }
        self.record(WriteKind::Replace, collection, id);
        Ok(())
    }

    fn delete(&self, collection: &str, id: DocumentId) -> StoreResult<()> {
        {
            let mut collections = self.collections.write();
            let docs = collections
                .get_mut(collection)
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            let position = docs
                .iter()
                .position(|d| d.id == id)
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            docs.remove(position);
        }
        self.record(WriteKind::Delete, collection, id);
        Ok(())
    }

    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(None);
        };
        if let Some(id) = filter.pinned_id() {
            return match docs.iter().find(|d| d.id == id) {
                Some(stored) => {
                    let doc = from_cbor(&stored.bytes)?;
                    Ok(filter.matches(&doc).then_some(doc))
                }
                None => Ok(None),
            };
        }
        for stored in docs {
            let doc = from_cbor(&stored.bytes)?;
            if filter.matches(&doc) {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    fn id_assignment(&self) -> IdAssignment {
        self.id_assignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docweave_codec::{Value, ID_FIELD};

    #[test]
    fn insert_generates_id_and_stores_it() {
        let store = InMemoryStore::new();
        let id = store
            .insert("orders", Document::new().with("title", "Order"))
            .unwrap();

        let doc = store.find_by_id("orders", id).unwrap().unwrap();
        assert_eq!(doc.id(), Some(id));
        assert_eq!(doc.get("title"), Some(&Value::from("Order")));
        assert_eq!(store.count("orders"), 1);
    }

    #[test]
    fn insert_honours_client_id() {
        let store = InMemoryStore::new();
        let id = DocumentId::new();
        let returned = store
            .insert("orders", Document::new().with(ID_FIELD, id))
            .unwrap();
        assert_eq!(returned, id);
    }

    #[test]
    fn insert_rejects_duplicate_client_id() {
        let store = InMemoryStore::new();
        let id = DocumentId::new();
        store.insert("orders", Document::new().with(ID_FIELD, id)).unwrap();
        let err = store
            .insert("orders", Document::new().with(ID_FIELD, id))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
    }

    #[test]
    fn generated_store_rejects_client_id() {
        let store = InMemoryStore::with_id_assignment(IdAssignment::StoreGenerated);
        let err = store
            .insert("orders", Document::new().with(ID_FIELD, DocumentId::new()))
            .unwrap_err();
        assert!(matches!(err, StoreError::ClientIdRejected { .. }));
        assert!(store.insert("orders", Document::new()).is_ok());
    }

    #[test]
    fn replace_overwrites_and_keeps_id() {
        let store = InMemoryStore::new();
        let id = store.insert("c", Document::new().with("n", 1)).unwrap();
        store.replace("c", id, Document::new().with("n", 2)).unwrap();

        let doc = store.find_by_id("c", id).unwrap().unwrap();
        assert_eq!(doc.get("n"), Some(&Value::Integer(2)));
        assert_eq!(doc.id(), Some(id));
    }

    #[test]
    fn replace_missing_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .replace("c", DocumentId::new(), Document::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn delete_removes_document() {
        let store = InMemoryStore::new();
        let id = store.insert("c", Document::new()).unwrap();
        store.delete("c", id).unwrap();
        assert_eq!(store.count("c"), 0);
        assert!(matches!(
            store.delete("c", id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn find_one_follows_insertion_order() {
        let store = InMemoryStore::new();
        store.insert("h", Document::new().with("name", "Root")).unwrap();
        store.insert("h", Document::new().with("name", "Child")).unwrap();

        let first = store.find_one("h", &Filter::all()).unwrap().unwrap();
        assert_eq!(first.get("name"), Some(&Value::from("Root")));

        let child = store
            .find_one("h", &Filter::all().eq("name", "Child"))
            .unwrap()
            .unwrap();
        assert_eq!(child.get("name"), Some(&Value::from("Child")));

        assert!(store
            .find_one("h", &Filter::all().eq("name", "Nobody"))
            .unwrap()
            .is_none());
        assert!(store.find_one("missing", &Filter::all()).unwrap().is_none());
    }

    #[test]
    fn journal_records_writes_in_order() {
        let store = InMemoryStore::new();
        let a = store.insert("a", Document::new()).unwrap();
        let b = store.insert("b", Document::new()).unwrap();
        store.replace("a", a, Document::new()).unwrap();
        store.delete("b", b).unwrap();

        let kinds: Vec<_> = store.journal().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WriteKind::Insert,
                WriteKind::Insert,
                WriteKind::Replace,
                WriteKind::Delete
            ]
        );
        assert_eq!(store.journal_for("a").len(), 2);
    }

    #[test]
    fn stored_bytes_are_canonical() {
        let store = InMemoryStore::new();
        let id = DocumentId::new();
        let doc = Document::new().with(ID_FIELD, id).with("b", 1).with("a", 2);
        store.insert("c", doc.clone()).unwrap();
        assert_eq!(store.raw_bytes("c", id), Some(to_canonical_cbor(&doc)));
    }

    #[test]
    fn clear_drops_everything() {
        let store = InMemoryStore::new();
        store.insert("c", Document::new()).unwrap();
        store.clear();
        assert_eq!(store.count("c"), 0);
        assert!(store.journal().is_empty());
    }
}
