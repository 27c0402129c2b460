//! Change computation.

use super::identity::IdentityMap;
use super::snapshot::{Capture, ComposedState, Snapshot, SnapshotStore};
use crate::config::Config;
use crate::error::CoreResult;
use crate::instance::{DocHandle, InstanceKey, RefIdentity};
use crate::schema::SchemaRegistry;
use docweave_codec::{DocumentId, Value};
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use tracing::{debug, trace};

/// One difference between a baseline and the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDelta {
    /// A scalar changed. Absent and null are the same value.
    Scalar {
        /// Field name.
        field: String,
        /// Baseline value.
        old: Value,
        /// Current value.
        new: Value,
    },
    /// An embed-one field now holds a different instance, or was set or
    /// cleared.
    EmbedReplaced {
        /// Field name.
        field: String,
        /// Baseline child.
        old: Option<InstanceKey>,
        /// Current child.
        new: Option<InstanceKey>,
    },
    /// An embedded child present in both states changed internally.
    EmbedMutated {
        /// Field name.
        field: String,
        /// Current position for embed-many; `None` for embed-one.
        position: Option<usize>,
        /// The child's own changes.
        change: ChangeTree,
    },
    /// A child was added to an embed-many field.
    EmbedAdded {
        /// Field name.
        field: String,
        /// Current position.
        position: usize,
        /// The new child.
        key: InstanceKey,
    },
    /// A child was removed from an embed-many field.
    EmbedRemoved {
        /// Field name.
        field: String,
        /// Baseline position.
        position: usize,
        /// The removed child.
        key: InstanceKey,
    },
    /// Children present in both states appear in a different order.
    EmbedReordered {
        /// Field name.
        field: String,
        /// Common children in baseline order.
        old_order: Vec<InstanceKey>,
        /// Common children in current order.
        new_order: Vec<InstanceKey>,
    },
    /// A reference-one field points elsewhere.
    ReferenceSet {
        /// Field name.
        field: String,
        /// Baseline target.
        old: Option<RefIdentity>,
        /// Current target.
        new: Option<RefIdentity>,
    },
    /// A reference was added to a reference-many field.
    ReferenceAdded {
        /// Field name.
        field: String,
        /// Current position.
        position: usize,
        /// Added target.
        target: RefIdentity,
    },
    /// A reference was removed from a reference-many field.
    ReferenceRemoved {
        /// Field name.
        field: String,
        /// Baseline position.
        position: usize,
        /// Removed target.
        target: RefIdentity,
    },
    /// References present in both states appear in a different order.
    ReferencesReordered {
        /// Field name.
        field: String,
        /// Common targets in baseline order.
        old_order: Vec<RefIdentity>,
        /// Common targets in current order.
        new_order: Vec<RefIdentity>,
    },
}

impl FieldDelta {
    /// Name of the field this delta is about.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Scalar { field, .. }
            | Self::EmbedReplaced { field, .. }
            | Self::EmbedMutated { field, .. }
            | Self::EmbedAdded { field, .. }
            | Self::EmbedRemoved { field, .. }
            | Self::EmbedReordered { field, .. }
            | Self::ReferenceSet { field, .. }
            | Self::ReferenceAdded { field, .. }
            | Self::ReferenceRemoved { field, .. }
            | Self::ReferencesReordered { field, .. } => field,
        }
    }
}

/// Changes of one instance since its baseline.
///
/// For roots, `is_new` marks an instance never inserted and `untracked` a
/// stored root without a baseline; both are written in full and carry no
/// deltas. Embedded nodes appear only inside [`FieldDelta::EmbedMutated`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeTree {
    /// Instance the changes belong to.
    pub key: InstanceKey,
    /// Its type.
    pub type_name: String,
    /// Stored identifier of a root.
    pub id: Option<DocumentId>,
    /// Root awaiting insertion.
    pub is_new: bool,
    /// Stored root with no baseline.
    pub untracked: bool,
    /// Field-level differences.
    pub deltas: Vec<FieldDelta>,
}

impl ChangeTree {
    fn embedded(snapshot: &Snapshot, deltas: Vec<FieldDelta>) -> Self {
        Self {
            key: snapshot.key,
            type_name: snapshot.type_name.clone(),
            id: None,
            is_new: false,
            untracked: false,
            deltas,
        }
    }

    /// Returns true if nothing needs writing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.is_new && !self.untracked && self.deltas.is_empty()
    }

    /// Deltas on `field`.
    pub fn deltas_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldDelta> + 'a {
        self.deltas.iter().filter(move |d| d.field() == field)
    }

    /// Returns true if any delta is on `field`.
    #[must_use]
    pub fn touches(&self, field: &str) -> bool {
        self.deltas_for(field).next().is_some()
    }
}

/// Differences between two snapshots of the same instance.
#[must_use]
pub fn diff(old: &Snapshot, new: &Snapshot) -> Vec<FieldDelta> {
    let mut deltas = Vec::new();

    let scalar_fields: BTreeSet<&String> = old.scalars.keys().chain(new.scalars.keys()).collect();
    for field in scalar_fields {
        let (before, after) = (old.scalar(field), new.scalar(field));
        if before != after {
            deltas.push(FieldDelta::Scalar {
                field: field.clone(),
                old: before.clone(),
                new: after.clone(),
            });
        }
    }

    for (field, after) in &new.composed {
        let empty;
        let before = match old.composed.get(field) {
            Some(before) => before,
            None => {
                empty = after.empty_like();
                &empty
            }
        };
        diff_composed(field, before, after, &mut deltas);
    }
    deltas
}

fn diff_composed(field: &str, before: &ComposedState, after: &ComposedState, out: &mut Vec<FieldDelta>) {
    match (before, after) {
        (ComposedState::EmbedOne(a), ComposedState::EmbedOne(b)) => match (a, b) {
            (None, None) => {}
            (Some(a), Some(b)) if a.key == b.key => {
                let inner = diff(a, b);
                if !inner.is_empty() {
                    out.push(FieldDelta::EmbedMutated {
                        field: field.to_string(),
                        position: None,
                        change: ChangeTree::embedded(b, inner),
                    });
                }
            }
            _ => out.push(FieldDelta::EmbedReplaced {
                field: field.to_string(),
                old: a.as_ref().map(|s| s.key),
                new: b.as_ref().map(|s| s.key),
            }),
        },
        (ComposedState::EmbedMany(a), ComposedState::EmbedMany(b)) => {
            let old_keys: Vec<_> = a.iter().map(|s| s.key).collect();
            let new_keys: Vec<_> = b.iter().map(|s| s.key).collect();
            let seq = sequence_diff(&old_keys, &new_keys);
            for (position, key) in seq.removed {
                out.push(FieldDelta::EmbedRemoved {
                    field: field.to_string(),
                    position,
                    key,
                });
            }
            for (position, key) in seq.added {
                out.push(FieldDelta::EmbedAdded {
                    field: field.to_string(),
                    position,
                    key,
                });
            }
            if let Some((old_order, new_order)) = seq.reordered {
                out.push(FieldDelta::EmbedReordered {
                    field: field.to_string(),
                    old_order,
                    new_order,
                });
            }
            for (position, child) in b.iter().enumerate() {
                let Some(previous) = a.iter().find(|s| s.key == child.key) else {
                    continue;
                };
                let inner = diff(previous, child);
                if !inner.is_empty() {
                    out.push(FieldDelta::EmbedMutated {
                        field: field.to_string(),
                        position: Some(position),
                        change: ChangeTree::embedded(child, inner),
                    });
                }
            }
        }
        (ComposedState::RefOne(a), ComposedState::RefOne(b)) => {
            if a != b {
                out.push(FieldDelta::ReferenceSet {
                    field: field.to_string(),
                    old: *a,
                    new: *b,
                });
            }
        }
        (ComposedState::RefMany(a), ComposedState::RefMany(b)) => {
            let seq = sequence_diff(a, b);
            for (position, target) in seq.removed {
                out.push(FieldDelta::ReferenceRemoved {
                    field: field.to_string(),
                    position,
                    target,
                });
            }
            for (position, target) in seq.added {
                out.push(FieldDelta::ReferenceAdded {
                    field: field.to_string(),
                    position,
                    target,
                });
            }
            if let Some((old_order, new_order)) = seq.reordered {
                out.push(FieldDelta::ReferencesReordered {
                    field: field.to_string(),
                    old_order,
                    new_order,
                });
            }
        }
        // A field whose kind changed between snapshots: compare against empty.
        (_, after) => diff_composed(field, &after.empty_like(), after, out),
    }
}

impl ComposedState {
    fn empty_like(&self) -> Self {
        match self {
            Self::EmbedOne(_) => Self::EmbedOne(None),
            Self::EmbedMany(_) => Self::EmbedMany(Vec::new()),
            Self::RefOne(_) => Self::RefOne(None),
            Self::RefMany(_) => Self::RefMany(Vec::new()),
        }
    }
}

struct SequenceDiff<T> {
    removed: Vec<(usize, T)>,
    added: Vec<(usize, T)>,
    reordered: Option<(Vec<T>, Vec<T>)>,
}

/// Multiset difference of two sequences, plus whether the elements they
/// share appear in a different relative order.
fn sequence_diff<T: Copy + Eq + Hash>(old: &[T], new: &[T]) -> SequenceDiff<T> {
    fn keep<T: Copy + Eq + Hash>(from: &[T], against: &[T]) -> (Vec<T>, Vec<(usize, T)>) {
        let mut counts: HashMap<T, usize> = HashMap::new();
        for item in against {
            *counts.entry(*item).or_insert(0) += 1;
        }
        let mut kept = Vec::new();
        let mut dropped = Vec::new();
        for (position, item) in from.iter().enumerate() {
            match counts.get_mut(item) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    kept.push(*item);
                }
                _ => dropped.push((position, *item)),
            }
        }
        (kept, dropped)
    }

    let (kept_old, removed) = keep(old, new);
    let (kept_new, added) = keep(new, old);
    let reordered = (kept_old != kept_new).then_some((kept_old, kept_new));
    SequenceDiff {
        removed,
        added,
        reordered,
    }
}

/// Computes change trees for every managed root.
pub struct ChangeEngine<'a> {
    schema: &'a SchemaRegistry,
    max_depth: usize,
}

impl<'a> ChangeEngine<'a> {
    /// Creates an engine over `schema`.
    #[must_use]
    pub fn new(schema: &'a SchemaRegistry, config: &Config) -> Self {
        Self {
            schema,
            max_depth: config.max_embed_depth,
        }
    }

    /// Computes the non-empty change trees of all managed roots, in
    /// registration order.
    ///
    /// Attached instances reachable through a reference (from a root or
    /// anywhere in its embedded subtree) that are not managed yet are
    /// registered as roots, and their own references are followed in turn.
    /// One that already carries an id has no baseline and is written in
    /// full. References are never descended into otherwise: a change inside
    /// a referenced root belongs to that root's own tree. Keys in `skip` are
    /// neither computed nor registered.
    ///
    /// # Errors
    ///
    /// Fails if an instance does not fit the schema or embeds too deeply.
    pub fn compute(
        &self,
        identity: &mut IdentityMap,
        baselines: &SnapshotStore,
        skip: &[InstanceKey],
    ) -> CoreResult<Vec<ChangeTree>> {
        let mut queue = identity.keys();
        let mut trees = Vec::new();
        let mut next = 0;

        while next < queue.len() {
            let key = queue[next];
            next += 1;
            if skip.contains(&key) {
                continue;
            }
            let Some(handle) = identity.get(key).cloned() else {
                continue;
            };

            let mut capture = Capture::new(self.schema, self.max_depth);
            let current = capture.snapshot(&handle)?;
            for target in capture.into_attached() {
                let target_key = target.key();
                if !identity.contains(target_key) && !skip.contains(&target_key) {
                    self.schema.collection_of(&target.type_name())?;
                    debug!(from = %key, target = %target_key, "cascading persist to referenced instance");
                    identity.register(&target)?;
                    queue.push(target_key);
                }
            }

            let tree = self.root_tree(&handle, baselines.get(key), &current);
            trace!(root = %key, new = tree.is_new, deltas = tree.deltas.len(), "computed changes");
            if !tree.is_empty() {
                trees.push(tree);
            }
        }
        Ok(trees)
    }

    fn root_tree(&self, handle: &DocHandle, baseline: Option<&Snapshot>, current: &Snapshot) -> ChangeTree {
        let id = handle.id();
        let (deltas, untracked) = match baseline {
            Some(baseline) if id.is_some() => (diff(baseline, current), false),
            _ => (Vec::new(), id.is_some()),
        };
        ChangeTree {
            key: current.key,
            type_name: current.type_name.clone(),
            id,
            is_new: id.is_none(),
            untracked,
            deltas,
        }
    }
}
