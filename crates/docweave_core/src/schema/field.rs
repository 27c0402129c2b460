//! Field mappings.

/// How a field participates in persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// An opaque value stored as-is.
    Scalar,
    /// At most one embedded instance, stored inline.
    EmbedOne,
    /// An ordered sequence of embedded instances, stored inline.
    EmbedMany,
    /// At most one reference to a root document, stored as its identifier.
    ReferenceOne,
    /// An ordered sequence of references, stored as identifiers.
    ReferenceMany,
}

impl FieldKind {
    /// Returns true for embed-one and embed-many.
    #[must_use]
    pub fn is_embed(self) -> bool {
        matches!(self, Self::EmbedOne | Self::EmbedMany)
    }

    /// Returns true for reference-one and reference-many.
    #[must_use]
    pub fn is_reference(self) -> bool {
        matches!(self, Self::ReferenceOne | Self::ReferenceMany)
    }

    /// Returns true for the sequence kinds.
    #[must_use]
    pub fn is_many(self) -> bool {
        matches!(self, Self::EmbedMany | Self::ReferenceMany)
    }

    pub(crate) fn describe(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::EmbedOne => "embed-one",
            Self::EmbedMany => "embed-many",
            Self::ReferenceOne => "reference-one",
            Self::ReferenceMany => "reference-many",
        }
    }
}

/// When referenced documents are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceLoading {
    /// Placeholders are resolved on demand.
    Lazy,
    /// Placeholders are resolved right after the owning root is materialized.
    Eager,
}

/// One field of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    name: String,
    kind: FieldKind,
    target: Option<String>,
    required: bool,
    loading: Option<ReferenceLoading>,
}

impl FieldMapping {
    fn new(name: impl Into<String>, kind: FieldKind, target: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target,
            required: false,
            loading: None,
        }
    }

    /// A scalar field.
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar, None)
    }

    /// An embed-one field holding a `target` instance.
    #[must_use]
    pub fn embed_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldKind::EmbedOne, Some(target.into()))
    }

    /// An embed-many field holding `target` instances.
    #[must_use]
    pub fn embed_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldKind::EmbedMany, Some(target.into()))
    }

    /// A reference-one field pointing at a `target` root.
    #[must_use]
    pub fn reference_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ReferenceOne, Some(target.into()))
    }

    /// A reference-many field pointing at `target` roots.
    #[must_use]
    pub fn reference_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ReferenceMany, Some(target.into()))
    }

    /// Marks the field as required: a stored document lacking it fails to
    /// materialize.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Resolves this reference field eagerly on materialization.
    #[must_use]
    pub fn eager(mut self) -> Self {
        self.loading = Some(ReferenceLoading::Eager);
        self
    }

    /// Resolves this reference field only on demand.
    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.loading = Some(ReferenceLoading::Lazy);
        self
    }

    /// Field name, also the key in the stored document.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field kind.
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Target type of an embed or reference field.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Whether a stored document must carry this field.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Declared loading strategy, if any.
    #[must_use]
    pub fn loading(&self) -> Option<ReferenceLoading> {
        self.loading
    }

    /// Loading strategy with `default` applied.
    #[must_use]
    pub fn loading_or(&self, default: ReferenceLoading) -> ReferenceLoading {
        self.loading.unwrap_or(default)
    }
}

/// An ordered set of field mappings.
///
/// Types that share a base declare its fields once as a `FieldSet` and
/// extend it, so a document type and an embedded type can carry the same
/// capabilities without duplicating declarations.
///
/// ```
/// use docweave_core::schema::{FieldMapping, FieldSet, TypeSchema};
///
/// let base = FieldSet::new()
///     .field(FieldMapping::scalar("name"))
///     .field(FieldMapping::embed_many("children", "ChildCategory"));
///
/// let root = TypeSchema::document("Category", "categories").with_fields(&base);
/// let child = TypeSchema::embedded("ChildCategory").with_fields(&base);
/// assert_eq!(root.fields().count(), child.fields().count());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    fields: Vec<FieldMapping>,
}

impl FieldSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a mapping.
    #[must_use]
    pub fn field(mut self, mapping: FieldMapping) -> Self {
        self.fields.push(mapping);
        self
    }

    /// Appends every mapping of `other`.
    #[must_use]
    pub fn extend(mut self, other: &FieldSet) -> Self {
        self.fields.extend(other.fields.iter().cloned());
        self
    }

    /// Looks up a mapping by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Iterates mappings in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, FieldMapping> {
        self.fields.iter()
    }

    /// Number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no mappings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn push(&mut self, mapping: FieldMapping) {
        self.fields.push(mapping);
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a FieldMapping;
    type IntoIter = std::slice::Iter<'a, FieldMapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
