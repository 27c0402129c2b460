//! Identity map of managed roots.

use crate::error::{CoreError, CoreResult};
use crate::instance::{DocHandle, InstanceKey};
use docweave_codec::DocumentId;
use std::collections::HashMap;

/// Managed roots of one unit of work.
///
/// Holds at most one instance per `(type, id)` and remembers registration
/// order, which breaks ties when ordering writes.
#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<InstanceKey, DocHandle>,
    order: Vec<InstanceKey>,
    by_identity: HashMap<(String, DocumentId), InstanceKey>,
}

impl IdentityMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a root, or refreshes the identifier binding of one that is
    /// already managed. A root binds at most one `(type, id)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if another instance already holds the
    /// same `(type, id)`.
    pub fn register(&mut self, handle: &DocHandle) -> CoreResult<InstanceKey> {
        let (key, type_name, id) = {
            let instance = handle.read();
            (instance.key(), instance.type_name().to_string(), instance.id())
        };

        if let Some(id) = id {
            let identity = (type_name, id);
            match self.by_identity.get(&identity) {
                Some(existing) if *existing != key => {
                    return Err(CoreError::invalid_operation(format!(
                        "{} {} is already managed by another instance",
                        identity.0, identity.1
                    )));
                }
                Some(_) => {}
                None => {
                    self.by_identity.retain(|_, k| *k != key);
                    self.by_identity.insert(identity, key);
                }
            }
        }

        if self.entries.insert(key, handle.clone()).is_none() {
            self.order.push(key);
        }
        Ok(key)
    }

    /// Finds the instance for a stored identity.
    #[must_use]
    pub fn lookup(&self, type_name: &str, id: DocumentId) -> Option<DocHandle> {
        self.by_identity
            .get(&(type_name.to_string(), id))
            .and_then(|key| self.entries.get(key))
            .cloned()
    }

    /// Returns the managed handle for `key`.
    #[must_use]
    pub fn get(&self, key: InstanceKey) -> Option<&DocHandle> {
        self.entries.get(&key)
    }

    /// Returns true if `key` is managed.
    #[must_use]
    pub fn contains(&self, key: InstanceKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Stops managing `key`.
    pub fn forget(&mut self, key: InstanceKey) -> Option<DocHandle> {
        let handle = self.entries.remove(&key)?;
        self.order.retain(|k| *k != key);
        self.by_identity.retain(|_, k| *k != key);
        Some(handle)
    }

    /// Managed keys in registration order.
    #[must_use]
    pub fn keys(&self) -> Vec<InstanceKey> {
        self.order.clone()
    }

    /// Registration position of `key`.
    #[must_use]
    pub fn position(&self, key: InstanceKey) -> Option<usize> {
        self.order.iter().position(|k| *k == key)
    }

    /// Managed handles in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &DocHandle> {
        self.order.iter().filter_map(|key| self.entries.get(key))
    }

    /// Number of managed roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is managed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.by_identity.clear();
    }
}
