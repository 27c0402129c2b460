//! Baseline snapshots of persisted state.

use crate::error::{CoreError, CoreResult};
use crate::instance::{DocHandle, InstanceKey, RefIdentity, Reference};
use crate::schema::{FieldKind, FieldMapping, SchemaRegistry};
use docweave_codec::Value;
use std::collections::{BTreeMap, HashMap};

/// Persisted-state copy of one instance and its embedded subtree.
///
/// Scalars are copied by value and embedded children are copied
/// recursively. References are captured as identities only, so a change
/// inside a referenced root never shows up in the referrer's snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub(crate) key: InstanceKey,
    pub(crate) type_name: String,
    pub(crate) scalars: BTreeMap<String, Value>,
    pub(crate) composed: BTreeMap<String, ComposedState>,
}

/// Captured state of one embed or reference field.
#[derive(Debug, Clone, PartialEq)]
pub enum ComposedState {
    /// Embed-one child.
    EmbedOne(Option<Box<Snapshot>>),
    /// Embed-many children, in order.
    EmbedMany(Vec<Snapshot>),
    /// Reference-one target.
    RefOne(Option<RefIdentity>),
    /// Reference-many targets, in order.
    RefMany(Vec<RefIdentity>),
}

impl Snapshot {
    /// Captures `handle` and its embedded subtree.
    ///
    /// # Errors
    ///
    /// Fails if the instance does not fit its schema or embeds deeper than
    /// `max_depth`.
    pub fn capture(
        handle: &DocHandle,
        schema: &SchemaRegistry,
        max_depth: usize,
    ) -> CoreResult<Self> {
        Capture::new(schema, max_depth).snapshot(handle)
    }

    /// Key of the captured instance.
    #[must_use]
    pub fn key(&self) -> InstanceKey {
        self.key
    }

    /// Type of the captured instance.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Captured scalar; absent and null are the same.
    #[must_use]
    pub fn scalar(&self, field: &str) -> &Value {
        const NULL: &Value = &Value::Null;
        self.scalars.get(field).unwrap_or(NULL)
    }

    /// Captured embed or reference field.
    #[must_use]
    pub fn composed(&self, field: &str) -> Option<&ComposedState> {
        self.composed.get(field)
    }
}

/// Walks an instance graph through the schema, producing a snapshot and
/// collecting the live instances its references are attached to.
pub(crate) struct Capture<'a> {
    schema: &'a SchemaRegistry,
    max_depth: usize,
    attached: Vec<DocHandle>,
}

impl<'a> Capture<'a> {
    pub(crate) fn new(schema: &'a SchemaRegistry, max_depth: usize) -> Self {
        Self {
            schema,
            max_depth,
            attached: Vec::new(),
        }
    }

    pub(crate) fn snapshot(&mut self, handle: &DocHandle) -> CoreResult<Snapshot> {
        self.walk(handle, 0)
    }

    /// Reference targets seen so far that are live instances, each once.
    pub(crate) fn into_attached(self) -> Vec<DocHandle> {
        self.attached
    }

    fn walk(&mut self, handle: &DocHandle, depth: usize) -> CoreResult<Snapshot> {
        let instance = handle.read();
        let type_schema = self.schema.resolve(instance.type_name())?;
        let mut snapshot = Snapshot {
            key: instance.key(),
            type_name: instance.type_name().to_string(),
            scalars: BTreeMap::new(),
            composed: BTreeMap::new(),
        };

        for mapping in type_schema.fields() {
            let name = mapping.name();
            let state = match mapping.kind() {
                FieldKind::Scalar => {
                    let value = instance.scalar(name)?;
                    if !value.is_null() {
                        snapshot.scalars.insert(name.to_string(), value);
                    }
                    continue;
                }
                FieldKind::EmbedOne => match instance.embed_one(name)? {
                    Some(child) => ComposedState::EmbedOne(Some(Box::new(self.child(
                        &child,
                        mapping,
                        instance.type_name(),
                        depth,
                    )?))),
                    None => ComposedState::EmbedOne(None),
                },
                FieldKind::EmbedMany => {
                    let children = instance.embed_many(name)?;
                    let mut captured = Vec::with_capacity(children.len());
                    for child in &children {
                        captured.push(self.child(child, mapping, instance.type_name(), depth)?);
                    }
                    ComposedState::EmbedMany(captured)
                }
                FieldKind::ReferenceOne => {
                    let reference = instance.ref_one(name)?;
                    if let Some(reference) = &reference {
                        self.note(reference, mapping, instance.type_name())?;
                    }
                    ComposedState::RefOne(reference.map(|r| r.identity()))
                }
                FieldKind::ReferenceMany => {
                    let references = instance.ref_many(name)?;
                    for reference in &references {
                        self.note(reference, mapping, instance.type_name())?;
                    }
                    ComposedState::RefMany(references.iter().map(Reference::identity).collect())
                }
            };
            snapshot.composed.insert(name.to_string(), state);
        }
        Ok(snapshot)
    }

    fn child(
        &mut self,
        child: &DocHandle,
        mapping: &FieldMapping,
        owner: &str,
        depth: usize,
    ) -> CoreResult<Snapshot> {
        if depth >= self.max_depth {
            return Err(CoreError::EmbedDepthExceeded {
                type_name: owner.to_string(),
                limit: self.max_depth,
            });
        }
        check_target(owner, mapping, &child.type_name())?;
        self.walk(child, depth + 1)
    }

    fn note(&mut self, reference: &Reference, mapping: &FieldMapping, owner: &str) -> CoreResult<()> {
        check_target(owner, mapping, &reference.type_name())?;
        if let Some(target) = reference.attached() {
            if !self.attached.iter().any(|seen| seen.ptr_eq(target)) {
                self.attached.push(target.clone());
            }
        }
        Ok(())
    }
}

/// Checks that an embedded child or reference target has the declared type.
pub(crate) fn check_target(owner: &str, mapping: &FieldMapping, actual: &str) -> CoreResult<()> {
    match mapping.target() {
        Some(target) if target == actual => Ok(()),
        Some(target) => Err(CoreError::schema_violation(
            owner,
            mapping.name(),
            format!("expected {target}, found {actual}"),
        )),
        None => Err(CoreError::schema_violation(
            owner,
            mapping.name(),
            "missing target type",
        )),
    }
}

/// Baselines of managed roots, keyed by instance.
///
/// A baseline is replaced wholesale whenever its root is re-baselined.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    baselines: HashMap<InstanceKey, Snapshot>,
}

impl SnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `snapshot` as the baseline of its root.
    pub fn insert(&mut self, snapshot: Snapshot) -> Option<Snapshot> {
        self.baselines.insert(snapshot.key, snapshot)
    }

    /// Baseline of `key`.
    #[must_use]
    pub fn get(&self, key: InstanceKey) -> Option<&Snapshot> {
        self.baselines.get(&key)
    }

    /// Returns true if `key` has a baseline.
    #[must_use]
    pub fn contains(&self, key: InstanceKey) -> bool {
        self.baselines.contains_key(&key)
    }

    /// Drops the baseline of `key`.
    pub fn remove(&mut self, key: InstanceKey) -> Option<Snapshot> {
        self.baselines.remove(&key)
    }

    /// Number of baselines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    /// Returns true if there are no baselines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    /// Drops every baseline.
    pub fn clear(&mut self) {
        self.baselines.clear();
    }
}
