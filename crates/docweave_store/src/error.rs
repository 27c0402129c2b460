//! Error types for store operations.

use docweave_codec::{CodecError, DocumentId};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No document with this identifier exists in the collection.
    #[error("document {id} not found in collection {collection}")]
    NotFound {
        /// Collection searched.
        collection: String,
        /// Missing identifier.
        id: DocumentId,
    },

    /// An insert carried an `_id` that is already taken.
    #[error("document {id} already exists in collection {collection}")]
    DuplicateId {
        /// Target collection.
        collection: String,
        /// Conflicting identifier.
        id: DocumentId,
    },

    /// The store assigns identifiers itself and refuses client ones.
    #[error("store generates identifiers; insert into {collection} carried an _id")]
    ClientIdRejected {
        /// Target collection.
        collection: String,
    },

    /// Stored bytes could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(collection: impl Into<String>, id: DocumentId) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id,
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
