//! Fault injection.
//!
//! Wraps an [`InMemoryStore`] and misbehaves on a chosen write, so tests
//! can observe partial flushes.

use docweave_codec::{Document, DocumentId};
use docweave_core::CancelFlag;
use docweave_store::{DocumentStore, Filter, IdAssignment, InMemoryStore, StoreError, StoreResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A store that fails or cancels on the n-th write (1-based).
///
/// Reads always pass through. Inserts, replaces and deletes are counted
/// together.
pub struct FaultyStore {
    inner: Arc<InMemoryStore>,
    writes: AtomicUsize,
    fail_on: Option<usize>,
    cancel: Option<(usize, CancelFlag)>,
}

impl FaultyStore {
    /// Fails write number `n` with `StoreError::Unavailable`.
    pub fn failing_on(inner: Arc<InMemoryStore>, n: usize) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
            fail_on: Some(n),
            cancel: None,
        }
    }

    /// Sets `flag` once write number `n` has been applied.
    pub fn cancelling_after(inner: Arc<InMemoryStore>, n: usize, flag: CancelFlag) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
            fail_on: None,
            cancel: Some((n, flag)),
        }
    }

    /// Writes attempted so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write<T>(&self, op: impl FnOnce(&InMemoryStore) -> StoreResult<T>) -> StoreResult<T> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(n) {
            return Err(StoreError::unavailable(format!("injected failure on write {n}")));
        }
        let result = op(&self.inner)?;
        if let Some((after, flag)) = &self.cancel {
            if *after == n {
                flag.cancel();
            }
        }
        Ok(result)
    }
}

impl DocumentStore for FaultyStore {
    fn insert(&self, collection: &str, document: Document) -> StoreResult<DocumentId> {
        self.write(|store| store.insert(collection, document))
    }

    fn replace(&self, collection: &str, id: DocumentId, document: Document) -> StoreResult<()> {
        self.write(|store| store.replace(collection, id, document))
    }

    fn delete(&self, collection: &str, id: DocumentId) -> StoreResult<()> {
        self.write(|store| store.delete(collection, id))
    }

    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        self.inner.find_one(collection, filter)
    }

    fn id_assignment(&self) -> IdAssignment {
        self.inner.id_assignment()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fails_only_the_chosen_write() {
        let inner = Arc::new(InMemoryStore::new());
        let store = FaultyStore::failing_on(inner.clone(), 2);
        assert!(store.insert("c", Document::new()).is_ok());
        assert!(matches!(
            store.insert("c", Document::new()),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.insert("c", Document::new()).is_ok());
        assert_eq!(inner.count("c"), 2);
        assert_eq!(store.attempts(), 3);
    }

    #[test]
    fn cancels_after_the_chosen_write() {
        let flag = CancelFlag::new();
        let store = FaultyStore::cancelling_after(Arc::new(InMemoryStore::new()), 1, flag.clone());
        store.insert("c", Document::new()).unwrap();
        assert!(flag.is_cancelled());
    }
}
