//! Instances and shared handles to them.

use super::reference::Reference;
use crate::error::{CoreError, CoreResult};
use crate::schema::FieldKind;
use docweave_codec::{DocumentId, Value};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-local identity of an in-memory instance.
///
/// Keys are never reused, so they tell instances apart before (and
/// regardless of) any stored identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceKey(u64);

impl InstanceKey {
    fn next() -> Self {
        Self(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inst:{}", self.0)
    }
}

/// Value held by one field of an instance.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Opaque value.
    Scalar(Value),
    /// Embedded child, if any.
    EmbedOne(Option<DocHandle>),
    /// Embedded children, in order.
    EmbedMany(Vec<DocHandle>),
    /// Referenced root, if any.
    RefOne(Option<Reference>),
    /// Referenced roots, in order.
    RefMany(Vec<Reference>),
}

impl FieldValue {
    fn kind(&self) -> FieldKind {
        match self {
            Self::Scalar(_) => FieldKind::Scalar,
            Self::EmbedOne(_) => FieldKind::EmbedOne,
            Self::EmbedMany(_) => FieldKind::EmbedMany,
            Self::RefOne(_) => FieldKind::ReferenceOne,
            Self::RefMany(_) => FieldKind::ReferenceMany,
        }
    }
}

/// A typed, mutable record.
///
/// Fields are untyped at this level; the schema says how each one is
/// interpreted. A field that was never set reads as null, unset, or empty
/// depending on its declared kind.
#[derive(Debug)]
pub struct Instance {
    key: InstanceKey,
    type_name: String,
    id: Option<DocumentId>,
    fields: BTreeMap<String, FieldValue>,
}

impl Instance {
    /// The instance key.
    #[must_use]
    pub fn key(&self) -> InstanceKey {
        self.key
    }

    /// The type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The stored identifier, once the instance is a persisted root.
    #[must_use]
    pub fn id(&self) -> Option<DocumentId> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: DocumentId) {
        self.id = Some(id);
    }

    /// Raw field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Sets a raw field value.
    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Names of the fields that have been set.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    fn mismatch(&self, name: &str, expected: FieldKind, found: &FieldValue) -> CoreError {
        CoreError::schema_violation(
            &self.type_name,
            name,
            format!(
                "declared {} but holds {}",
                expected.describe(),
                found.kind().describe()
            ),
        )
    }

    pub(crate) fn scalar(&self, name: &str) -> CoreResult<Value> {
        match self.fields.get(name) {
            None => Ok(Value::Null),
            Some(FieldValue::Scalar(v)) => Ok(v.clone()),
            Some(other) => Err(self.mismatch(name, FieldKind::Scalar, other)),
        }
    }

    pub(crate) fn embed_one(&self, name: &str) -> CoreResult<Option<DocHandle>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(FieldValue::EmbedOne(child)) => Ok(child.clone()),
            Some(other) => Err(self.mismatch(name, FieldKind::EmbedOne, other)),
        }
    }

    pub(crate) fn embed_many(&self, name: &str) -> CoreResult<Vec<DocHandle>> {
        match self.fields.get(name) {
            None => Ok(Vec::new()),
            Some(FieldValue::EmbedMany(children)) => Ok(children.clone()),
            Some(other) => Err(self.mismatch(name, FieldKind::EmbedMany, other)),
        }
    }

    pub(crate) fn ref_one(&self, name: &str) -> CoreResult<Option<Reference>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(FieldValue::RefOne(r)) => Ok(r.clone()),
            Some(other) => Err(self.mismatch(name, FieldKind::ReferenceOne, other)),
        }
    }

    pub(crate) fn ref_many(&self, name: &str) -> CoreResult<Vec<Reference>> {
        match self.fields.get(name) {
            None => Ok(Vec::new()),
            Some(FieldValue::RefMany(refs)) => Ok(refs.clone()),
            Some(other) => Err(self.mismatch(name, FieldKind::ReferenceMany, other)),
        }
    }

    pub(crate) fn ref_one_mut(&mut self, name: &str) -> Option<&mut Reference> {
        match self.fields.get_mut(name) {
            Some(FieldValue::RefOne(Some(r))) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn ref_many_mut(&mut self, name: &str) -> Option<&mut Vec<Reference>> {
        match self.fields.get_mut(name) {
            Some(FieldValue::RefMany(refs)) => Some(refs),
            _ => None,
        }
    }
}

/// Shared, mutable handle to an [`Instance`].
///
/// Handles are cheap to clone; clones observe the same instance. The
/// unit of work, parents embedding the instance, and references to it all
/// hold handles, so an instance lives as long as anything points at it.
///
/// # Example
///
/// ```
/// use docweave_core::DocHandle;
///
/// let order = DocHandle::new("Order");
/// let product = DocHandle::new("Product");
/// product.set("title", "Product");
/// order.set("title", "Order");
/// order.set_embedded("product", Some(product.clone()));
///
/// product.set("title", "Renamed");
/// assert_eq!(
///     order.embedded("product").unwrap().get("title").as_text(),
///     Some("Renamed")
/// );
/// ```
#[derive(Clone)]
pub struct DocHandle(Arc<RwLock<Instance>>);

/// Non-owning counterpart of [`DocHandle`].
#[derive(Clone, Default)]
pub struct WeakDocHandle(Weak<RwLock<Instance>>);

impl WeakDocHandle {
    /// Upgrades to a handle if the instance is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<DocHandle> {
        self.0.upgrade().map(DocHandle)
    }
}

impl fmt::Debug for WeakDocHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakDocHandle")
    }
}

impl DocHandle {
    /// Creates a fresh, unsaved instance of `type_name`.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(Instance {
            key: InstanceKey::next(),
            type_name: type_name.into(),
            id: None,
            fields: BTreeMap::new(),
        })))
    }

    /// Shared access to the instance.
    ///
    /// Read access is recursive, so a graph that reaches the same instance
    /// twice (a self-reference, say) can be walked while it is held.
    pub fn read(&self) -> RwLockReadGuard<'_, Instance> {
        self.0.read_recursive()
    }

    /// Exclusive access to the instance.
    pub fn write(&self) -> RwLockWriteGuard<'_, Instance> {
        self.0.write()
    }

    /// Returns a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakDocHandle {
        WeakDocHandle(Arc::downgrade(&self.0))
    }

    /// Returns true if both handles point at the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &DocHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The instance key.
    #[must_use]
    pub fn key(&self) -> InstanceKey {
        self.read().key
    }

    /// The type name.
    #[must_use]
    pub fn type_name(&self) -> String {
        self.read().type_name.clone()
    }

    /// The stored identifier, if any.
    #[must_use]
    pub fn id(&self) -> Option<DocumentId> {
        self.read().id
    }

    /// Sets a scalar field.
    pub fn set(&self, field: impl Into<String>, value: impl Into<Value>) {
        self.write()
            .set_field(field, FieldValue::Scalar(value.into()));
    }

    /// Reads a scalar field; anything else reads as null.
    #[must_use]
    pub fn get(&self, field: &str) -> Value {
        match self.read().field(field) {
            Some(FieldValue::Scalar(v)) => v.clone(),
            _ => Value::Null,
        }
    }

    /// Sets or clears an embed-one field.
    pub fn set_embedded(&self, field: impl Into<String>, child: Option<DocHandle>) {
        self.write().set_field(field, FieldValue::EmbedOne(child));
    }

    /// Reads an embed-one field.
    #[must_use]
    pub fn embedded(&self, field: &str) -> Option<DocHandle> {
        match self.read().field(field) {
            Some(FieldValue::EmbedOne(child)) => child.clone(),
            _ => None,
        }
    }

    /// Appends to an embed-many field.
    pub fn push_embedded(&self, field: impl Into<String>, child: DocHandle) {
        self.update_embedded_many(field, |children| children.push(child));
    }

    /// Reads an embed-many field.
    #[must_use]
    pub fn embedded_many(&self, field: &str) -> Vec<DocHandle> {
        match self.read().field(field) {
            Some(FieldValue::EmbedMany(children)) => children.clone(),
            _ => Vec::new(),
        }
    }

    /// Edits an embed-many field in place. A field holding anything else is
    /// reset to an empty sequence first.
    pub fn update_embedded_many<R>(
        &self,
        field: impl Into<String>,
        f: impl FnOnce(&mut Vec<DocHandle>) -> R,
    ) -> R {
        let field = field.into();
        let mut instance = self.write();
        let mut children = match instance.fields.remove(&field) {
            Some(FieldValue::EmbedMany(children)) => children,
            _ => Vec::new(),
        };
        let result = f(&mut children);
        instance.fields.insert(field, FieldValue::EmbedMany(children));
        result
    }

    /// Points a reference-one field at `target`, or clears it.
    pub fn set_reference(&self, field: impl Into<String>, target: Option<&DocHandle>) {
        // Built before locking: target may be this very instance.
        let reference = target.map(Reference::to);
        self.write().set_field(field, FieldValue::RefOne(reference));
    }

    /// Reads a reference-one field.
    #[must_use]
    pub fn reference(&self, field: &str) -> Option<Reference> {
        match self.read().field(field) {
            Some(FieldValue::RefOne(r)) => r.clone(),
            _ => None,
        }
    }

    /// Appends a reference to a reference-many field.
    pub fn push_reference(&self, field: impl Into<String>, target: &DocHandle) {
        let reference = Reference::to(target);
        self.update_references(field, |refs| refs.push(reference));
    }

    /// Reads a reference-many field.
    #[must_use]
    pub fn references(&self, field: &str) -> Vec<Reference> {
        match self.read().field(field) {
            Some(FieldValue::RefMany(refs)) => refs.clone(),
            _ => Vec::new(),
        }
    }

    /// Edits a reference-many field in place. A field holding anything else
    /// is reset to an empty sequence first.
    pub fn update_references<R>(
        &self,
        field: impl Into<String>,
        f: impl FnOnce(&mut Vec<Reference>) -> R,
    ) -> R {
        let field = field.into();
        let mut instance = self.write();
        let mut refs = match instance.fields.remove(&field) {
            Some(FieldValue::RefMany(refs)) => refs,
            _ => Vec::new(),
        };
        let result = f(&mut refs);
        instance.fields.insert(field, FieldValue::RefMany(refs));
        result
    }
}

impl fmt::Debug for DocHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Fields are left out: graphs may be cyclic.
        match self.0.try_read_recursive() {
            Some(instance) => f
                .debug_struct("DocHandle")
                .field("key", &instance.key)
                .field("type_name", &instance.type_name)
                .field("id", &instance.id)
                .finish(),
            None => f.write_str("DocHandle(<locked>)"),
        }
    }
}
