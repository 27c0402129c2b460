//! Ordering change trees into store operations.

use super::operation::{Operation, OperationKind};
use super::serialize::DocumentWriter;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::instance::InstanceKey;
use crate::schema::SchemaRegistry;
use crate::tracking::{ChangeTree, IdentityMap};
use docweave_codec::DocumentId;
use docweave_store::IdAssignment;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Turns change trees into an ordered list of operations.
///
/// Every changed root yields exactly one insert or replace carrying its
/// full serialized subtree. New roots get a provisional identifier up
/// front so that referrers can be serialized before the store has seen
/// them. Writes are ordered so a new root is inserted before any root whose
/// payload references it; ties keep registration order. Deletes follow all
/// writes.
pub struct Planner<'a> {
    schema: &'a SchemaRegistry,
    max_depth: usize,
    id_assignment: IdAssignment,
}

struct PlannedWrite {
    operation: Operation,
    dependencies: Vec<usize>,
}

impl<'a> Planner<'a> {
    /// Creates a planner for a store with the given identifier contract.
    #[must_use]
    pub fn new(schema: &'a SchemaRegistry, config: &Config, id_assignment: IdAssignment) -> Self {
        Self {
            schema,
            max_depth: config.max_embed_depth,
            id_assignment,
        }
    }

    /// Plans `trees` followed by deletes of `removals`.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvableCycle` if new roots reference each other in a
    /// cycle and the store generates identifiers itself. Nothing has been
    /// written when planning fails.
    pub fn plan(
        &self,
        trees: &[ChangeTree],
        identity: &IdentityMap,
        removals: &[InstanceKey],
    ) -> CoreResult<Vec<Operation>> {
        let changed: Vec<&ChangeTree> = trees
            .iter()
            .filter(|tree| !tree.is_empty() && identity.contains(tree.key))
            .collect();

        let provisional: HashMap<InstanceKey, DocumentId> = changed
            .iter()
            .filter(|tree| tree.is_new)
            .map(|tree| (tree.key, DocumentId::new()))
            .collect();
        let position: HashMap<InstanceKey, usize> = changed
            .iter()
            .enumerate()
            .map(|(index, tree)| (tree.key, index))
            .collect();

        let writer = DocumentWriter::new(self.schema, self.max_depth, &provisional);
        let mut writes = Vec::with_capacity(changed.len());
        for tree in &changed {
            writes.push(self.plan_write(tree, identity, &writer, &provisional, &position)?);
        }

        let mut operations = self.order(writes)?;

        for key in removals {
            let Some(handle) = identity.get(*key) else {
                continue;
            };
            let instance = handle.read();
            let Some(id) = instance.id() else {
                continue;
            };
            operations.push(Operation {
                kind: OperationKind::Delete,
                collection: self.schema.collection_of(instance.type_name())?.to_string(),
                instance: *key,
                type_name: instance.type_name().to_string(),
                id,
                payload: None,
                depends_on: Vec::new(),
            });
        }

        debug!(
            operations = operations.len(),
            inserts = provisional.len(),
            "planned flush"
        );
        Ok(operations)
    }

    fn plan_write(
        &self,
        tree: &ChangeTree,
        identity: &IdentityMap,
        writer: &DocumentWriter<'_>,
        provisional: &HashMap<InstanceKey, DocumentId>,
        position: &HashMap<InstanceKey, usize>,
    ) -> CoreResult<PlannedWrite> {
        let handle = identity
            .get(tree.key)
            .ok_or_else(|| CoreError::invalid_operation(format!("{} is not managed", tree.key)))?;
        let collection = self.schema.collection_of(&tree.type_name)?.to_string();
        let written = writer.write_root(handle)?;
        let mut payload = written.document;

        let (kind, id) = match (tree.id, provisional.get(&tree.key)) {
            (Some(id), _) => (OperationKind::Replace, id),
            (None, Some(id)) => {
                if self.id_assignment == IdAssignment::ClientAllowed {
                    payload.set_id(*id);
                }
                (OperationKind::Insert, *id)
            }
            (None, None) => {
                return Err(CoreError::invalid_operation(format!(
                    "{} has neither an identifier nor a provisional one",
                    tree.key
                )))
            }
        };

        let dependencies = written
            .pending
            .iter()
            .filter_map(|key| position.get(key).copied())
            .collect();

        Ok(PlannedWrite {
            operation: Operation {
                kind,
                collection,
                instance: tree.key,
                type_name: tree.type_name.clone(),
                id,
                payload: Some(payload),
                depends_on: written.pending,
            },
            dependencies,
        })
    }

    /// Kahn's algorithm, always taking the earliest ready write.
    fn order(&self, writes: Vec<PlannedWrite>) -> CoreResult<Vec<Operation>> {
        let mut indegree: Vec<usize> = writes.iter().map(|w| w.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); writes.len()];
        for (index, write) in writes.iter().enumerate() {
            for dependency in &write.dependencies {
                dependents[*dependency].push(index);
            }
        }

        let mut ready: BTreeSet<usize> = indegree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(index, _)| index)
            .collect();
        let mut sequence = Vec::with_capacity(writes.len());
        while let Some(index) = ready.pop_first() {
            sequence.push(index);
            for dependent in &dependents[index] {
                indegree[*dependent] -= 1;
                if indegree[*dependent] == 0 {
                    ready.insert(*dependent);
                }
            }
        }

        if sequence.len() < writes.len() {
            let stuck: Vec<usize> = (0..writes.len()).filter(|i| indegree[*i] > 0).collect();
            let members: Vec<String> = stuck
                .iter()
                .map(|i| {
                    let op = &writes[*i].operation;
                    format!("{}#{}", op.type_name, op.instance)
                })
                .collect();
            match self.id_assignment {
                IdAssignment::ClientAllowed => {
                    warn!(members = ?members, "reference cycle among new roots; inserting with client identifiers");
                    sequence.extend(stuck);
                }
                IdAssignment::StoreGenerated => {
                    return Err(CoreError::UnresolvableCycle { members });
                }
            }
        }

        let mut slots: Vec<Option<Operation>> = writes.into_iter().map(|w| Some(w.operation)).collect();
        Ok(sequence
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::DocHandle;
    use crate::schema::{FieldMapping, TypeSchema};
    use crate::tracking::{ChangeEngine, Snapshot, SnapshotStore};
    use docweave_codec::Value;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(
                TypeSchema::document("Node", "nodes")
                    .field(FieldMapping::scalar("name"))
                    .field(FieldMapping::reference_one("next", "Node")),
            )
            .unwrap()
    }

    fn node(name: &str) -> DocHandle {
        let h = DocHandle::new("Node");
        h.set("name", name);
        h
    }

    fn plan_with(
        identity: &mut IdentityMap,
        baselines: &SnapshotStore,
        removals: &[InstanceKey],
        id_assignment: IdAssignment,
    ) -> CoreResult<Vec<Operation>> {
        let registry = registry();
        let config = Config::default();
        let trees = ChangeEngine::new(&registry, &config).compute(identity, baselines, removals)?;
        Planner::new(&registry, &config, id_assignment).plan(&trees, identity, removals)
    }

    #[test]
    fn referenced_new_root_is_inserted_first() {
        let mut identity = IdentityMap::new();
        let head = node("head");
        let tail = node("tail");
        head.set_reference("next", Some(&tail));
        identity.register(&head).unwrap();

        let ops = plan_with(&mut identity, &SnapshotStore::new(), &[], IdAssignment::ClientAllowed).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].instance, tail.key());
        assert_eq!(ops[1].instance, head.key());
        assert_eq!(ops[1].depends_on, vec![tail.key()]);

        let head_payload = ops[1].payload.as_ref().unwrap();
        assert_eq!(head_payload.get("next"), Some(&Value::Id(ops[0].id)));
        assert_eq!(head_payload.id(), Some(ops[1].id));
    }

    #[test]
    fn independent_roots_keep_registration_order() {
        let mut identity = IdentityMap::new();
        let (a, b, c) = (node("a"), node("b"), node("c"));
        for h in [&a, &b, &c] {
            identity.register(h).unwrap();
        }
        let ops = plan_with(&mut identity, &SnapshotStore::new(), &[], IdAssignment::ClientAllowed).unwrap();
        let order: Vec<_> = ops.iter().map(|op| op.instance).collect();
        assert_eq!(order, vec![a.key(), b.key(), c.key()]);
        assert!(ops.iter().all(Operation::is_insert));
    }

    #[test]
    fn generated_ids_leave_payload_without_id() {
        let mut identity = IdentityMap::new();
        let a = node("a");
        identity.register(&a).unwrap();
        let ops = plan_with(&mut identity, &SnapshotStore::new(), &[], IdAssignment::StoreGenerated).unwrap();
        assert!(ops[0].payload.as_ref().unwrap().id().is_none());
    }

    #[test]
    fn cycle_with_generated_ids_is_rejected() {
        let mut identity = IdentityMap::new();
        let (a, b) = (node("a"), node("b"));
        a.set_reference("next", Some(&b));
        b.set_reference("next", Some(&a));
        identity.register(&a).unwrap();

        let err = plan_with(&mut identity, &SnapshotStore::new(), &[], IdAssignment::StoreGenerated).unwrap_err();
        match err {
            CoreError::UnresolvableCycle { members } => assert_eq!(members.len(), 2),
            other => panic!("unexpected {other:?}"),
        }

        let ops = plan_with(&mut identity, &SnapshotStore::new(), &[], IdAssignment::ClientAllowed).unwrap();
        assert_eq!(ops.len(), 2);

        a.set_reference("next", None);
        b.set_reference("next", None);
    }

    #[test]
    fn deletes_follow_writes_and_unchanged_roots_are_skipped() {
        let registry = registry();
        let mut identity = IdentityMap::new();
        let mut baselines = SnapshotStore::new();

        let (kept, doomed, fresh) = (node("kept"), node("doomed"), node("fresh"));
        for h in [&kept, &doomed] {
            h.write().set_id(DocumentId::new());
            identity.register(h).unwrap();
            baselines.insert(Snapshot::capture(h, &registry, 8).unwrap());
        }
        identity.register(&fresh).unwrap();

        let ops = plan_with(
            &mut identity,
            &baselines,
            &[doomed.key()],
            IdAssignment::ClientAllowed,
        )
        .unwrap();
        let kinds: Vec<_> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::Insert, OperationKind::Delete]);
        assert_eq!(ops[1].id, doomed.id().unwrap());
        assert!(ops[1].payload.is_none());
    }
}
