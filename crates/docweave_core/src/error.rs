//! Error types for docweave core.

use crate::persist::OperationKind;
use docweave_codec::{CodecError, DocumentId};
use docweave_store::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in docweave core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An identifier is neither in the identity map nor in the store.
    #[error("unknown identity: {type_name} {id}")]
    UnknownIdentity {
        /// Document type searched.
        type_name: String,
        /// Identifier that could not be resolved.
        id: DocumentId,
    },

    /// New documents reference each other in a cycle and the store cannot
    /// accept locally assigned identifiers.
    #[error("unresolvable reference cycle among new documents: {}", members.join(", "))]
    UnresolvableCycle {
        /// The new roots left unordered, as `Type#instance`.
        members: Vec<String>,
    },

    /// The store rejected a planned operation. Earlier operations of the
    /// same flush remain applied.
    #[error("{kind} on {collection} failed: {source}")]
    StoreOperationFailed {
        /// Kind of the failed operation.
        kind: OperationKind,
        /// Target collection.
        collection: String,
        /// Error reported by the store.
        #[source]
        source: StoreError,
    },

    /// A stored document does not fit the schema.
    #[error("cannot materialize {type_name}.{field}: {message}")]
    MaterializationMismatch {
        /// Type being materialized.
        type_name: String,
        /// Offending field.
        field: String,
        /// What was wrong.
        message: String,
    },

    /// A type name is not registered.
    #[error("unknown document type: {type_name}")]
    UnknownType {
        /// The unregistered name.
        type_name: String,
    },

    /// An instance or schema declaration is inconsistent with the schema.
    #[error("schema violation on {type_name}.{field}: {message}")]
    SchemaViolation {
        /// Type involved.
        type_name: String,
        /// Field involved.
        field: String,
        /// Description of the violation.
        message: String,
    },

    /// Embedded documents nest deeper than the configured limit.
    #[error("embedding depth exceeds {limit} below {type_name}")]
    EmbedDepthExceeded {
        /// Type at which the limit was hit.
        type_name: String,
        /// Configured limit.
        limit: usize,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Store error outside of a planned operation (reads).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl CoreError {
    /// Creates an unknown identity error.
    pub fn unknown_identity(type_name: impl Into<String>, id: DocumentId) -> Self {
        Self::UnknownIdentity {
            type_name: type_name.into(),
            id,
        }
    }

    /// Creates a materialization mismatch error.
    pub fn materialization_mismatch(
        type_name: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::MaterializationMismatch {
            type_name: type_name.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown type error.
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self::UnknownType {
            type_name: type_name.into(),
        }
    }

    /// Creates a schema violation error.
    pub fn schema_violation(
        type_name: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SchemaViolation {
            type_name: type_name.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a store operation failure.
    pub fn store_operation_failed(
        kind: OperationKind,
        collection: impl Into<String>,
        source: StoreError,
    ) -> Self {
        Self::StoreOperationFailed {
            kind,
            collection: collection.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_members() {
        let err = CoreError::UnresolvableCycle {
            members: vec!["Node#inst:1".into(), "Node#inst:2".into()],
        };
        assert_eq!(
            err.to_string(),
            "unresolvable reference cycle among new documents: Node#inst:1, Node#inst:2"
        );
    }

    #[test]
    fn store_failure_keeps_source() {
        let err = CoreError::store_operation_failed(
            OperationKind::Replace,
            "orders",
            StoreError::unavailable("disk full"),
        );
        assert!(err.to_string().starts_with("replace on orders failed"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
