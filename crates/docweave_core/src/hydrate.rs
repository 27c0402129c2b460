//! Stored-document to instance conversion.

use crate::config::{Config, MissingReferencePolicy};
use crate::error::{CoreError, CoreResult};
use crate::instance::{DocHandle, FieldValue, Reference};
use crate::schema::{FieldKind, FieldMapping, ReferenceLoading, SchemaRegistry, TypeSchema};
use crate::tracking::{IdentityMap, Snapshot, SnapshotStore};
use docweave_codec::{Document, Value, ID_FIELD};
use docweave_store::DocumentStore;
use tracing::{debug, trace};

/// Materializes stored documents into managed roots.
///
/// Embedded content becomes child instances; references become
/// placeholders carrying the stored identifier. A root is registered and
/// baselined before any of its eager references are resolved, so cycles
/// through references end at the identity map. A root whose eager
/// references fail to resolve is forgotten again.
pub(crate) struct Materializer<'a> {
    pub(crate) schema: &'a SchemaRegistry,
    pub(crate) config: &'a Config,
    pub(crate) store: &'a dyn DocumentStore,
    pub(crate) identity: &'a mut IdentityMap,
    pub(crate) baselines: &'a mut SnapshotStore,
}

impl Materializer<'_> {
    /// Returns the managed root for `document`, building it if needed.
    pub(crate) fn hydrate(&mut self, type_name: &str, document: &Document) -> CoreResult<DocHandle> {
        let schema = self.schema;
        let type_schema = schema.resolve(type_name)?;
        if !type_schema.is_document() {
            return Err(CoreError::invalid_operation(format!(
                "{type_name} is an embedded type and cannot be materialized as a root"
            )));
        }
        let id = match document.get(ID_FIELD) {
            Some(Value::Id(id)) => *id,
            Some(other) => {
                return Err(CoreError::materialization_mismatch(
                    type_name,
                    ID_FIELD,
                    format!("expected identifier, found {}", other.kind_name()),
                ))
            }
            None => {
                return Err(CoreError::materialization_mismatch(
                    type_name,
                    ID_FIELD,
                    "stored document has no identifier",
                ))
            }
        };

        if let Some(existing) = self.identity.lookup(type_name, id) {
            trace!(type_name, %id, "identity map hit");
            return Ok(existing);
        }

        let handle = self.build(type_schema, document, 0)?;
        handle.write().set_id(id);
        self.identity.register(&handle)?;
        self.baselines.insert(Snapshot::capture(
            &handle,
            schema,
            self.config.max_embed_depth,
        )?);
        debug!(type_name, %id, "materialized root");

        let eager: Vec<&str> = type_schema
            .fields()
            .filter(|f| f.kind().is_reference())
            .filter(|f| f.loading_or(self.config.default_reference_loading) == ReferenceLoading::Eager)
            .map(FieldMapping::name)
            .collect();
        let key = handle.key();
        for field in eager {
            if let Err(err) = self.load_field(&handle, field) {
                self.identity.forget(key);
                self.baselines.remove(key);
                return Err(err);
            }
        }
        Ok(handle)
    }

    /// Resolves every reference of `field` on `handle`, in order, and
    /// records the resolved targets on their placeholders.
    pub(crate) fn load_field(&mut self, handle: &DocHandle, field: &str) -> CoreResult<Vec<DocHandle>> {
        let (kind, references) = {
            let instance = handle.read();
            let type_schema = self.schema.resolve(instance.type_name())?;
            let mapping =
                type_schema.expect_field(field, &[FieldKind::ReferenceOne, FieldKind::ReferenceMany])?;
            let references: Vec<Reference> = match mapping.kind() {
                FieldKind::ReferenceOne => instance.ref_one(field)?.into_iter().collect(),
                _ => instance.ref_many(field)?,
            };
            (mapping.kind(), references)
        };

        let mut targets = Vec::with_capacity(references.len());
        for reference in &references {
            targets.push(self.resolve(reference)?);
        }

        // Read target ids before locking: a target may be `handle` itself.
        let target_ids: Vec<_> = targets.iter().map(DocHandle::id).collect();
        let mut instance = handle.write();
        match kind {
            FieldKind::ReferenceOne => {
                if let (Some(reference), Some(target)) = (instance.ref_one_mut(field), targets.first()) {
                    if reference.id() == target_ids[0] {
                        reference.mark_loaded(target);
                    }
                }
            }
            _ => {
                if let Some(list) = instance.ref_many_mut(field) {
                    for ((reference, target), id) in list.iter_mut().zip(&targets).zip(&target_ids) {
                        if reference.id() == *id {
                            reference.mark_loaded(target);
                        }
                    }
                }
            }
        }
        Ok(targets)
    }

    /// Resolves one reference through the identity map, then the store.
    pub(crate) fn resolve(&mut self, reference: &Reference) -> CoreResult<DocHandle> {
        if let Some(target) = reference.target() {
            return Ok(target);
        }
        let Reference::Stored { type_name, id, .. } = reference else {
            return Err(CoreError::invalid_operation("attached reference without target"));
        };
        if let Some(existing) = self.identity.lookup(type_name, *id) {
            return Ok(existing);
        }
        let collection = self.schema.collection_of(type_name)?;
        match self.store.find_by_id(collection, *id)? {
            Some(document) => self.hydrate(type_name, &document),
            None => Err(CoreError::unknown_identity(type_name.as_str(), *id)),
        }
    }

    fn build(&self, type_schema: &TypeSchema, document: &Document, depth: usize) -> CoreResult<DocHandle> {
        let owner = type_schema.name();
        let handle = DocHandle::new(owner);
        let mut instance = handle.write();

        for mapping in type_schema.fields() {
            let name = mapping.name();
            let stored = document.get(name).filter(|v| !v.is_null());
            if stored.is_none() && mapping.is_required() {
                return Err(CoreError::materialization_mismatch(owner, name, "required field is missing"));
            }
            let value = match (mapping.kind(), stored) {
                (FieldKind::Scalar, None) => continue,
                (FieldKind::Scalar, Some(value)) => FieldValue::Scalar(value.clone()),

                (FieldKind::EmbedOne, None) => FieldValue::EmbedOne(None),
                (FieldKind::EmbedOne, Some(Value::Map(nested))) => {
                    FieldValue::EmbedOne(Some(self.embedded(mapping, owner, nested, depth)?))
                }

                (FieldKind::EmbedMany, None) => FieldValue::EmbedMany(Vec::new()),
                (FieldKind::EmbedMany, Some(Value::Array(items))) => {
                    let mut children = Vec::with_capacity(items.len());
                    for item in items {
                        let Value::Map(nested) = item else {
                            return Err(CoreError::materialization_mismatch(
                                owner,
                                name,
                                format!("expected embedded document, found {}", item.kind_name()),
                            ));
                        };
                        children.push(self.embedded(mapping, owner, nested, depth)?);
                    }
                    FieldValue::EmbedMany(children)
                }

                (FieldKind::ReferenceOne, None) => {
                    self.missing_reference(owner, mapping, document)?;
                    FieldValue::RefOne(None)
                }
                (FieldKind::ReferenceOne, Some(Value::Id(id))) => {
                    FieldValue::RefOne(Some(Reference::placeholder(target_of(mapping), *id)))
                }

                (FieldKind::ReferenceMany, None) => {
                    self.missing_reference(owner, mapping, document)?;
                    FieldValue::RefMany(Vec::new())
                }
                (FieldKind::ReferenceMany, Some(Value::Array(items))) => {
                    let mut references = Vec::with_capacity(items.len());
                    for item in items {
                        let Value::Id(id) = item else {
                            return Err(CoreError::materialization_mismatch(
                                owner,
                                name,
                                format!("expected identifier, found {}", item.kind_name()),
                            ));
                        };
                        references.push(Reference::placeholder(target_of(mapping), *id));
                    }
                    FieldValue::RefMany(references)
                }

                (kind, Some(other)) => {
                    return Err(CoreError::materialization_mismatch(
                        owner,
                        name,
                        format!("{} field holds {}", kind.describe(), other.kind_name()),
                    ))
                }
            };
            instance.set_field(name, value);
        }
        drop(instance);
        Ok(handle)
    }

    fn embedded(
        &self,
        mapping: &FieldMapping,
        owner: &str,
        nested: &Document,
        depth: usize,
    ) -> CoreResult<DocHandle> {
        if depth >= self.config.max_embed_depth {
            return Err(CoreError::EmbedDepthExceeded {
                type_name: owner.to_string(),
                limit: self.config.max_embed_depth,
            });
        }
        let target = self.schema.resolve(target_of(mapping))?;
        self.build(target, nested, depth + 1)
    }

    fn missing_reference(&self, owner: &str, mapping: &FieldMapping, document: &Document) -> CoreResult<()> {
        if document.contains_key(mapping.name()) {
            // Explicit null: the reference is unset.
            return Ok(());
        }
        match self.config.missing_reference_policy {
            MissingReferencePolicy::TreatAsEmpty => Ok(()),
            MissingReferencePolicy::Reject => Err(CoreError::materialization_mismatch(
                owner,
                mapping.name(),
                "reference key is missing",
            )),
        }
    }
}

fn target_of(mapping: &FieldMapping) -> &str {
    mapping.target().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeSchema;
    use docweave_codec::DocumentId;
    use docweave_store::InMemoryStore;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(
                TypeSchema::document("Category", "categories")
                    .field(FieldMapping::scalar("name").required())
                    .field(FieldMapping::embed_many("children", "Child"))
                    .field(FieldMapping::reference_many("related", "Category")),
            )
            .unwrap()
            .with(
                TypeSchema::embedded("Child")
                    .field(FieldMapping::scalar("name"))
                    .field(FieldMapping::embed_many("children", "Child")),
            )
            .unwrap()
    }

    struct Fixture {
        registry: SchemaRegistry,
        config: Config,
        store: InMemoryStore,
        identity: IdentityMap,
        baselines: SnapshotStore,
    }

    impl Fixture {
        fn new(config: Config) -> Self {
            Self {
                registry: registry(),
                config,
                store: InMemoryStore::new(),
                identity: IdentityMap::new(),
                baselines: SnapshotStore::new(),
            }
        }

        fn materializer(&mut self) -> Materializer<'_> {
            Materializer {
                schema: &self.registry,
                config: &self.config,
                store: &self.store,
                identity: &mut self.identity,
                baselines: &mut self.baselines,
            }
        }
    }

    fn stored(name: &str) -> Document {
        Document::new().with(ID_FIELD, DocumentId::new()).with("name", name)
    }

    #[test]
    fn absent_embed_many_reads_as_empty() {
        let mut fx = Fixture::new(Config::default());
        let handle = fx.materializer().hydrate("Category", &stored("Root")).unwrap();
        assert!(handle.embedded_many("children").is_empty());
        assert!(fx.baselines.contains(handle.key()));
        assert!(fx.identity.contains(handle.key()));
    }

    #[test]
    fn nested_embeds_become_children_without_ids() {
        let mut fx = Fixture::new(Config::default());
        let doc = stored("Root").with(
            "children",
            vec![Value::Map(Document::new().with("name", "Child").with(
                "children",
                vec![Value::Map(Document::new().with("name", "Grandchild"))],
            ))],
        );
        let root = fx.materializer().hydrate("Category", &doc).unwrap();
        let child = &root.embedded_many("children")[0];
        assert_eq!(child.get("name"), Value::from("Child"));
        assert_eq!(child.id(), None);
        assert_eq!(
            child.embedded_many("children")[0].get("name"),
            Value::from("Grandchild")
        );
    }

    #[test]
    fn identity_map_returns_existing_instance() {
        let mut fx = Fixture::new(Config::default());
        let doc = stored("Root");
        let first = fx.materializer().hydrate("Category", &doc).unwrap();
        let second = fx.materializer().hydrate("Category", &doc).unwrap();
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn missing_identifier_is_a_mismatch() {
        let mut fx = Fixture::new(Config::default());
        let err = fx
            .materializer()
            .hydrate("Category", &Document::new().with("name", "x"))
            .unwrap_err();
        assert!(matches!(err, CoreError::MaterializationMismatch { ref field, .. } if field == ID_FIELD));
    }

    #[test]
    fn wrong_shapes_are_mismatches() {
        let mut fx = Fixture::new(Config::default());
        let scalar_children = stored("Root").with("children", "oops");
        assert!(matches!(
            fx.materializer().hydrate("Category", &scalar_children),
            Err(CoreError::MaterializationMismatch { .. })
        ));

        let text_reference = stored("Root").with("related", vec![Value::from("nope")]);
        assert!(matches!(
            fx.materializer().hydrate("Category", &text_reference),
            Err(CoreError::MaterializationMismatch { .. })
        ));

        let nameless = Document::new().with(ID_FIELD, DocumentId::new());
        assert!(matches!(
            fx.materializer().hydrate("Category", &nameless),
            Err(CoreError::MaterializationMismatch { .. })
        ));
    }

    #[test]
    fn missing_reference_policy() {
        let mut lenient = Fixture::new(Config::default());
        let root = lenient.materializer().hydrate("Category", &stored("Root")).unwrap();
        assert!(root.references("related").is_empty());

        let mut strict =
            Fixture::new(Config::default().missing_reference_policy(MissingReferencePolicy::Reject));
        assert!(matches!(
            strict.materializer().hydrate("Category", &stored("Root")),
            Err(CoreError::MaterializationMismatch { .. })
        ));
    }

    #[test]
    fn references_load_lazily_through_the_store() {
        let mut fx = Fixture::new(Config::default());
        let target_id = fx
            .store
            .insert("categories", Document::new().with("name", "Target"))
            .unwrap();
        let doc = stored("Root").with("related", vec![Value::Id(target_id)]);

        let root = fx.materializer().hydrate("Category", &doc).unwrap();
        assert!(!root.references("related")[0].is_loaded());

        let targets = fx.materializer().load_field(&root, "related").unwrap();
        assert_eq!(targets[0].get("name"), Value::from("Target"));
        assert!(root.references("related")[0].target().unwrap().ptr_eq(&targets[0]));
    }

    #[test]
    fn dangling_reference_is_unknown_identity() {
        let mut fx = Fixture::new(Config::default());
        let doc = stored("Root").with("related", vec![Value::Id(DocumentId::new())]);
        let root = fx.materializer().hydrate("Category", &doc).unwrap();
        assert!(matches!(
            fx.materializer().load_field(&root, "related"),
            Err(CoreError::UnknownIdentity { .. })
        ));
    }

    #[test]
    fn eager_self_reference_terminates() {
        let mut fx = Fixture::new(Config::default().default_reference_loading(ReferenceLoading::Eager));
        let id = DocumentId::new();
        let doc = Document::new()
            .with(ID_FIELD, id)
            .with("name", "Loop")
            .with("related", vec![Value::Id(id)]);
        fx.store.insert("categories", doc.clone()).unwrap();

        let root = fx.materializer().hydrate("Category", &doc).unwrap();
        let target = root.references("related")[0].target().unwrap();
        assert!(target.ptr_eq(&root));
    }
}
