//! References between root documents.

use super::handle::{DocHandle, InstanceKey, WeakDocHandle};
use docweave_codec::DocumentId;
use std::fmt;

/// What a reference points at, for comparison purposes.
///
/// A reference to an instance that has not been inserted yet is known only
/// by its instance key; once inserted, by its stored identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefIdentity {
    /// A stored root.
    Stored(DocumentId),
    /// A root awaiting insertion.
    Pending(InstanceKey),
}

impl fmt::Display for RefIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored(id) => write!(f, "{id}"),
            Self::Pending(key) => write!(f, "pending {key}"),
        }
    }
}

/// A link from one field to a root document.
///
/// References never own the target's content: persisting the owner stores
/// only the target's identifier.
#[derive(Debug, Clone)]
pub enum Reference {
    /// Assigned in memory to a live instance.
    Attached(DocHandle),
    /// Read from the store. `loaded` is set once the target is resolved.
    Stored {
        /// Target type.
        type_name: String,
        /// Target identifier.
        id: DocumentId,
        /// The resolved instance, if any.
        loaded: Option<WeakDocHandle>,
    },
}

impl Reference {
    /// A reference to `target`.
    #[must_use]
    pub fn to(target: &DocHandle) -> Self {
        Self::Attached(target.clone())
    }

    /// An unresolved placeholder for a stored root.
    #[must_use]
    pub fn placeholder(type_name: impl Into<String>, id: DocumentId) -> Self {
        Self::Stored {
            type_name: type_name.into(),
            id,
            loaded: None,
        }
    }

    /// Target type.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Attached(handle) => handle.type_name(),
            Self::Stored { type_name, .. } => type_name.clone(),
        }
    }

    /// Target identifier, if the target is stored.
    #[must_use]
    pub fn id(&self) -> Option<DocumentId> {
        match self {
            Self::Attached(handle) => handle.id(),
            Self::Stored { id, .. } => Some(*id),
        }
    }

    /// Identity used for change detection.
    #[must_use]
    pub fn identity(&self) -> RefIdentity {
        match self {
            Self::Attached(handle) => {
                let instance = handle.read();
                instance
                    .id()
                    .map_or(RefIdentity::Pending(instance.key()), RefIdentity::Stored)
            }
            Self::Stored { id, .. } => RefIdentity::Stored(*id),
        }
    }

    /// The live target, if attached or already resolved.
    #[must_use]
    pub fn target(&self) -> Option<DocHandle> {
        match self {
            Self::Attached(handle) => Some(handle.clone()),
            Self::Stored { loaded, .. } => loaded.as_ref().and_then(WeakDocHandle::upgrade),
        }
    }

    /// Returns true if the target is available without a store read.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.target().is_some()
    }

    pub(crate) fn attached(&self) -> Option<&DocHandle> {
        match self {
            Self::Attached(handle) => Some(handle),
            Self::Stored { .. } => None,
        }
    }

    /// Records the instance a placeholder resolved to.
    pub(crate) fn mark_loaded(&mut self, handle: &DocHandle) {
        if let Self::Stored { loaded, .. } = self {
            *loaded = Some(handle.downgrade());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attached_identity_follows_insertion() {
        let target = DocHandle::new("Hierarchy");
        let reference = Reference::to(&target);
        assert_eq!(reference.identity(), RefIdentity::Pending(target.key()));
        assert_eq!(reference.id(), None);

        let id = DocumentId::new();
        target.write().set_id(id);
        assert_eq!(reference.identity(), RefIdentity::Stored(id));
        assert_eq!(reference.type_name(), "Hierarchy");
    }

    #[test]
    fn placeholder_loads_lazily() {
        let id = DocumentId::new();
        let mut reference = Reference::placeholder("Hierarchy", id);
        assert!(!reference.is_loaded());
        assert_eq!(reference.identity(), RefIdentity::Stored(id));

        let target = DocHandle::new("Hierarchy");
        reference.mark_loaded(&target);
        assert!(reference.target().unwrap().ptr_eq(&target));
        assert!(reference.attached().is_none());

        drop(target);
        assert!(!reference.is_loaded());
    }
}
