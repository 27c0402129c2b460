//! Instance to stored-document conversion.

use crate::error::{CoreError, CoreResult};
use crate::instance::{DocHandle, InstanceKey, RefIdentity, Reference};
use crate::schema::{FieldKind, FieldMapping, SchemaRegistry};
use crate::tracking::check_target;
use docweave_codec::{Document, DocumentId, Value};
use std::collections::HashMap;

/// A serialized root and the unsaved roots it references.
#[derive(Debug)]
pub(crate) struct Written {
    pub(crate) document: Document,
    pub(crate) pending: Vec<InstanceKey>,
}

/// Writes a root and its embedded subtree as one document.
///
/// Null scalars, unset embeds and empty sequences are left out. Embedded
/// children are written inline and never carry `_id`. References are
/// written as the target's identifier; unsaved targets use the provisional
/// identifier the planner assigned them.
pub(crate) struct DocumentWriter<'a> {
    schema: &'a SchemaRegistry,
    max_depth: usize,
    provisional: &'a HashMap<InstanceKey, DocumentId>,
}

impl<'a> DocumentWriter<'a> {
    pub(crate) fn new(
        schema: &'a SchemaRegistry,
        max_depth: usize,
        provisional: &'a HashMap<InstanceKey, DocumentId>,
    ) -> Self {
        Self {
            schema,
            max_depth,
            provisional,
        }
    }

    pub(crate) fn write_root(&self, handle: &DocHandle) -> CoreResult<Written> {
        let mut pending = Vec::new();
        let document = self.write(handle, 0, &mut pending)?;
        Ok(Written { document, pending })
    }

    fn write(&self, handle: &DocHandle, depth: usize, pending: &mut Vec<InstanceKey>) -> CoreResult<Document> {
        let instance = handle.read();
        let owner = instance.type_name();
        let type_schema = self.schema.resolve(owner)?;
        let mut document = Document::new();

        for mapping in type_schema.fields() {
            let name = mapping.name();
            match mapping.kind() {
                FieldKind::Scalar => {
                    let value = instance.scalar(name)?;
                    if !value.is_null() {
                        document.insert(name, value);
                    }
                }
                FieldKind::EmbedOne => {
                    if let Some(child) = instance.embed_one(name)? {
                        let nested = self.child(&child, mapping, owner, depth, pending)?;
                        document.insert(name, nested);
                    }
                }
                FieldKind::EmbedMany => {
                    let children = instance.embed_many(name)?;
                    if !children.is_empty() {
                        let mut items = Vec::with_capacity(children.len());
                        for child in &children {
                            items.push(Value::Map(self.child(child, mapping, owner, depth, pending)?));
                        }
                        document.insert(name, items);
                    }
                }
                FieldKind::ReferenceOne => {
                    if let Some(reference) = instance.ref_one(name)? {
                        let id = self.reference_id(&reference, mapping, owner, pending)?;
                        document.insert(name, id);
                    }
                }
                FieldKind::ReferenceMany => {
                    let references = instance.ref_many(name)?;
                    if !references.is_empty() {
                        let mut ids = Vec::with_capacity(references.len());
                        for reference in &references {
                            ids.push(Value::Id(self.reference_id(reference, mapping, owner, pending)?));
                        }
                        document.insert(name, ids);
                    }
                }
            }
        }
        Ok(document)
    }

    fn child(
        &self,
        child: &DocHandle,
        mapping: &FieldMapping,
        owner: &str,
        depth: usize,
        pending: &mut Vec<InstanceKey>,
    ) -> CoreResult<Document> {
        if depth >= self.max_depth {
            return Err(CoreError::EmbedDepthExceeded {
                type_name: owner.to_string(),
                limit: self.max_depth,
            });
        }
        check_target(owner, mapping, &child.type_name())?;
        self.write(child, depth + 1, pending)
    }

    fn reference_id(
        &self,
        reference: &Reference,
        mapping: &FieldMapping,
        owner: &str,
        pending: &mut Vec<InstanceKey>,
    ) -> CoreResult<DocumentId> {
        check_target(owner, mapping, &reference.type_name())?;
        match reference.identity() {
            RefIdentity::Stored(id) => Ok(id),
            RefIdentity::Pending(key) => {
                let id = self.provisional.get(&key).copied().ok_or_else(|| {
                    CoreError::invalid_operation(format!(
                        "{owner}.{} references an instance that is not persisted",
                        mapping.name()
                    ))
                })?;
                if !pending.contains(&key) {
                    pending.push(key);
                }
                Ok(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeSchema;
    use docweave_codec::ID_FIELD;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(
                TypeSchema::document("Category", "categories")
                    .field(FieldMapping::scalar("name"))
                    .field(FieldMapping::embed_many("children", "Child"))
                    .field(FieldMapping::reference_one("parent", "Category")),
            )
            .unwrap()
            .with(
                TypeSchema::embedded("Child")
                    .field(FieldMapping::scalar("name"))
                    .field(FieldMapping::embed_many("children", "Child")),
            )
            .unwrap()
    }

    #[test]
    fn writes_embedded_subtree_inline_without_ids() {
        let registry = registry();
        let provisional = HashMap::new();
        let writer = DocumentWriter::new(&registry, 8, &provisional);

        let root = DocHandle::new("Category");
        root.set("name", "Root");
        let child = DocHandle::new("Child");
        child.set("name", "Child");
        root.push_embedded("children", child);

        let written = writer.write_root(&root).unwrap();
        let doc = written.document;
        assert_eq!(doc.path("children.0.name"), Some(&Value::from("Child")));
        assert!(doc.path("children.0.children").is_none());
        assert!(doc.path("children.0._id").is_none());
        assert!(!doc.contains_key(ID_FIELD));
        assert!(!doc.contains_key("parent"));
        assert!(written.pending.is_empty());
    }

    #[test]
    fn pending_references_use_provisional_ids() {
        let registry = registry();
        let parent = DocHandle::new("Category");
        let id = DocumentId::new();
        let provisional = HashMap::from([(parent.key(), id)]);
        let writer = DocumentWriter::new(&registry, 8, &provisional);

        let root = DocHandle::new("Category");
        root.set_reference("parent", Some(&parent));
        let written = writer.write_root(&root).unwrap();
        assert_eq!(written.document.get("parent"), Some(&Value::Id(id)));
        assert_eq!(written.pending, vec![parent.key()]);
    }

    #[test]
    fn unpersisted_reference_without_provisional_id_fails() {
        let registry = registry();
        let provisional = HashMap::new();
        let writer = DocumentWriter::new(&registry, 8, &provisional);

        let root = DocHandle::new("Category");
        root.set_reference("parent", Some(&DocHandle::new("Category")));
        assert!(matches!(
            writer.write_root(&root),
            Err(CoreError::InvalidOperation { .. })
        ));
    }
}
