//! Schema declarations.
//!
//! A schema names each type, says whether it is a document type (with a
//! collection) or embedded-only, and classifies each field as scalar,
//! embedded or referenced. Everything else in the crate walks instances
//! through these declarations.

mod field;
mod registry;

pub use field::{FieldKind, FieldMapping, FieldSet, ReferenceLoading};
pub use registry::{SchemaRegistry, TypeSchema};
