//! Store-level operations produced by planning.

use crate::instance::InstanceKey;
use docweave_codec::{Document, DocumentId};
use std::fmt;

/// Kind of store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Insert a new root.
    Insert,
    /// Replace a stored root with its full current state.
    Replace,
    /// Delete a stored root.
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Insert => "insert",
            Self::Replace => "replace",
            Self::Delete => "delete",
        })
    }
}

/// One planned write.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Kind of write.
    pub kind: OperationKind,
    /// Target collection.
    pub collection: String,
    /// Root instance being written.
    pub instance: InstanceKey,
    /// Type of the root.
    pub type_name: String,
    /// Stored identifier, or the provisional one assigned for an insert.
    pub id: DocumentId,
    /// Full serialized root; `None` for deletes.
    pub payload: Option<Document>,
    /// New roots whose identifiers the payload carries.
    pub depends_on: Vec<InstanceKey>,
}

impl Operation {
    /// Returns true for inserts.
    #[must_use]
    pub fn is_insert(&self) -> bool {
        self.kind == OperationKind::Insert
    }
}
