//! Type schemas and their registry.

use super::field::{FieldKind, FieldMapping, FieldSet};
use crate::error::{CoreError, CoreResult};
use docweave_codec::ID_FIELD;
use std::collections::HashMap;
use tracing::debug;

/// Declared shape of one type.
///
/// A *document type* has a collection and may appear as a root. An
/// *embedded type* has no collection and can only live inside another
/// instance. Document types may also be embedded: the role of an instance
/// follows from where it sits in the graph, not from its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSchema {
    name: String,
    collection: Option<String>,
    fields: FieldSet,
}

impl TypeSchema {
    /// A document type stored in `collection`.
    #[must_use]
    pub fn document(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: Some(collection.into()),
            fields: FieldSet::new(),
        }
    }

    /// An embedded-only type.
    #[must_use]
    pub fn embedded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            fields: FieldSet::new(),
        }
    }

    /// Adds one field.
    #[must_use]
    pub fn field(mut self, mapping: FieldMapping) -> Self {
        self.fields.push(mapping);
        self
    }

    /// Adds every field of a shared set.
    #[must_use]
    pub fn with_fields(mut self, set: &FieldSet) -> Self {
        self.fields = self.fields.extend(set);
        self
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection of a document type.
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Returns true if instances of this type can be roots.
    #[must_use]
    pub fn is_document(&self) -> bool {
        self.collection.is_some()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> std::slice::Iter<'_, FieldMapping> {
        self.fields.iter()
    }

    /// Looks up a field.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.get(name)
    }

    /// Looks up a field, failing with `SchemaViolation` if it is missing or
    /// not of `kind`.
    pub(crate) fn expect_field(&self, name: &str, kinds: &[FieldKind]) -> CoreResult<&FieldMapping> {
        let mapping = self
            .get_field(name)
            .ok_or_else(|| CoreError::schema_violation(&self.name, name, "no such field"))?;
        if !kinds.contains(&mapping.kind()) {
            return Err(CoreError::schema_violation(
                &self.name,
                name,
                format!("field is {}", mapping.kind().describe()),
            ));
        }
        Ok(mapping)
    }
}

/// All known types, by name.
///
/// The registry is built once, validated, and then shared read-only by the
/// units of work that use it.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: HashMap<String, TypeSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken, a field is named `_id`, or two fields
    /// share a name.
    pub fn register(&mut self, schema: TypeSchema) -> CoreResult<()> {
        if self.types.contains_key(schema.name()) {
            return Err(CoreError::invalid_operation(format!(
                "type {} is already registered",
                schema.name()
            )));
        }
        let mut seen = Vec::with_capacity(schema.fields.len());
        for field in schema.fields() {
            if field.name() == ID_FIELD {
                return Err(CoreError::schema_violation(
                    schema.name(),
                    ID_FIELD,
                    "the identifier field is reserved",
                ));
            }
            if seen.contains(&field.name()) {
                return Err(CoreError::schema_violation(
                    schema.name(),
                    field.name(),
                    "declared twice",
                ));
            }
            seen.push(field.name());
        }
        debug!(type_name = schema.name(), fields = seen.len(), "registered type");
        self.types.insert(schema.name().to_string(), schema);
        Ok(())
    }

    /// Registers a type, builder style.
    ///
    /// # Errors
    ///
    /// See [`SchemaRegistry::register`].
    pub fn with(mut self, schema: TypeSchema) -> CoreResult<Self> {
        self.register(schema)?;
        Ok(self)
    }

    /// Checks that every embed and reference target exists and that
    /// references only point at document types.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` or `SchemaViolation` for the first problem.
    pub fn validate(&self) -> CoreResult<()> {
        let mut names: Vec<_> = self.types.keys().collect();
        names.sort();
        for name in names {
            let schema = &self.types[name];
            for field in schema.fields() {
                if field.kind() == FieldKind::Scalar {
                    continue;
                }
                let target = field.target().ok_or_else(|| {
                    CoreError::schema_violation(name, field.name(), "missing target type")
                })?;
                let target_schema = self.resolve(target)?;
                if field.kind().is_reference() && !target_schema.is_document() {
                    return Err(CoreError::schema_violation(
                        name,
                        field.name(),
                        format!("reference target {target} is not a document type"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Looks up a type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if the name is not registered.
    pub fn resolve(&self, type_name: &str) -> CoreResult<&TypeSchema> {
        self.types
            .get(type_name)
            .ok_or_else(|| CoreError::unknown_type(type_name))
    }

    /// Collection of a document type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType`, or `InvalidOperation` for embedded-only types.
    pub fn collection_of(&self, type_name: &str) -> CoreResult<&str> {
        self.resolve(type_name)?.collection().ok_or_else(|| {
            CoreError::invalid_operation(format!(
                "{type_name} is an embedded type and cannot be a root"
            ))
        })
    }

    /// Returns true if `type_name` is registered.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> TypeSchema {
        TypeSchema::document("Hierarchy", "hierarchy")
            .field(FieldMapping::scalar("name"))
            .field(FieldMapping::reference_many("children", "Hierarchy"))
    }

    #[test]
    fn register_and_resolve() {
        let registry = SchemaRegistry::new().with(hierarchy()).unwrap();
        assert!(registry.contains("Hierarchy"));
        assert_eq!(registry.collection_of("Hierarchy").unwrap(), "hierarchy");
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn unknown_type() {
        let registry = SchemaRegistry::new();
        assert!(matches!(
            registry.resolve("Nope"),
            Err(CoreError::UnknownType { .. })
        ));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = SchemaRegistry::new();
        registry.register(hierarchy()).unwrap();
        assert!(registry.register(hierarchy()).is_err());
    }

    #[test]
    fn reserved_and_duplicate_fields_rejected() {
        let mut registry = SchemaRegistry::new();
        let reserved = TypeSchema::document("A", "a").field(FieldMapping::scalar(ID_FIELD));
        assert!(matches!(
            registry.register(reserved),
            Err(CoreError::SchemaViolation { .. })
        ));

        let twice = TypeSchema::document("B", "b")
            .field(FieldMapping::scalar("x"))
            .field(FieldMapping::scalar("x"));
        assert!(registry.register(twice).is_err());
    }

    #[test]
    fn validate_catches_missing_target() {
        let registry = SchemaRegistry::new()
            .with(
                TypeSchema::document("Order", "orders")
                    .field(FieldMapping::embed_one("product", "Product")),
            )
            .unwrap();
        assert!(matches!(
            registry.validate(),
            Err(CoreError::UnknownType { .. })
        ));
    }

    #[test]
    fn validate_rejects_reference_to_embedded_type() {
        let registry = SchemaRegistry::new()
            .with(TypeSchema::embedded("Line"))
            .unwrap()
            .with(
                TypeSchema::document("Order", "orders")
                    .field(FieldMapping::reference_one("line", "Line")),
            )
            .unwrap();
        assert!(matches!(
            registry.validate(),
            Err(CoreError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn embedded_types_have_no_collection() {
        let registry = SchemaRegistry::new()
            .with(TypeSchema::embedded("Line"))
            .unwrap();
        assert!(!registry.resolve("Line").unwrap().is_document());
        assert!(matches!(
            registry.collection_of("Line"),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn expect_field_checks_kind() {
        let schema = hierarchy();
        assert!(schema
            .expect_field("children", &[FieldKind::ReferenceMany])
            .is_ok());
        assert!(schema
            .expect_field("children", &[FieldKind::ReferenceOne])
            .is_err());
        assert!(schema.expect_field("missing", &[FieldKind::Scalar]).is_err());
    }
}
