//! The unit of work.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::hydrate::Materializer;
use crate::instance::{DocHandle, InstanceKey};
use crate::persist::{DocumentWriter, Operation, OperationKind, Planner};
use crate::schema::SchemaRegistry;
use crate::tracking::{diff, ChangeEngine, ChangeTree, FieldDelta, IdentityMap, Snapshot, SnapshotStore};
use docweave_codec::{Document, DocumentId};
use docweave_store::{DocumentStore, Filter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cooperative cancellation for [`UnitOfWork::flush_with`].
///
/// Checked between operations: an operation already handed to the store
/// always completes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An operation the store confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOperation {
    /// Kind of write.
    pub kind: OperationKind,
    /// Target collection.
    pub collection: String,
    /// Root written.
    pub instance: InstanceKey,
    /// Identifier the root is stored under.
    pub id: DocumentId,
}

/// Outcome of a flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Operations applied, in order.
    pub applied: Vec<AppliedOperation>,
    /// Number of operations planned.
    pub planned: usize,
    /// True if cancellation stopped the flush early.
    pub cancelled: bool,
}

impl FlushReport {
    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }

    /// Number of applied operations of `kind`.
    #[must_use]
    pub fn count(&self, kind: OperationKind) -> usize {
        self.applied.iter().filter(|op| op.kind == kind).count()
    }
}

/// Tracks a graph of instances and writes its changes to a store.
///
/// Roots enter through [`persist`](Self::persist) or by being read back
/// ([`find`](Self::find), [`find_one`](Self::find_one),
/// [`hydrate`](Self::hydrate)). Unsaved instances reachable through a
/// reference from a managed root are persisted along with it. Nothing
/// reaches the store before [`flush`](Self::flush).
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use docweave_core::schema::{FieldMapping, SchemaRegistry, TypeSchema};
/// use docweave_core::{Config, DocHandle, UnitOfWork};
/// use docweave_store::InMemoryStore;
///
/// let schema = SchemaRegistry::new()
///     .with(TypeSchema::document("Order", "orders")
///         .field(FieldMapping::scalar("title"))
///         .field(FieldMapping::embed_one("product", "Product")))?
///     .with(TypeSchema::document("Product", "products")
///         .field(FieldMapping::scalar("title")))?;
/// let store = Arc::new(InMemoryStore::new());
/// let mut uow = UnitOfWork::new(Arc::new(schema), store.clone(), Config::default())?;
///
/// let order = DocHandle::new("Order");
/// order.set("title", "Order");
/// let product = DocHandle::new("Product");
/// product.set("title", "Product");
/// order.set_embedded("product", Some(product));
///
/// uow.persist(&order)?;
/// uow.flush()?;
/// assert_eq!(store.count("orders"), 1);
/// assert_eq!(store.count("products"), 0);
/// # Ok::<(), docweave_core::CoreError>(())
/// ```
pub struct UnitOfWork {
    schema: Arc<SchemaRegistry>,
    store: Arc<dyn DocumentStore>,
    config: Config,
    identity: IdentityMap,
    baselines: SnapshotStore,
    removals: Vec<InstanceKey>,
    deleted: Vec<InstanceKey>,
}

impl UnitOfWork {
    /// Creates a unit of work.
    ///
    /// # Errors
    ///
    /// Fails if the schema does not validate.
    pub fn new(
        schema: Arc<SchemaRegistry>,
        store: Arc<dyn DocumentStore>,
        config: Config,
    ) -> CoreResult<Self> {
        schema.validate()?;
        Ok(Self {
            schema,
            store,
            config,
            identity: IdentityMap::new(),
            baselines: SnapshotStore::new(),
            removals: Vec::new(),
            deleted: Vec::new(),
        })
    }

    /// The schema.
    #[must_use]
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Starts managing a root.
    ///
    /// A root scheduled for removal is un-scheduled instead.
    ///
    /// # Errors
    ///
    /// Fails for unknown or embedded-only types, or if another instance
    /// already represents the same stored document.
    pub fn persist(&mut self, handle: &DocHandle) -> CoreResult<InstanceKey> {
        let type_name = handle.type_name();
        self.schema.collection_of(&type_name)?;
        let key = self.identity.register(handle)?;
        self.removals.retain(|k| *k != key);
        self.deleted.retain(|k| *k != key);
        debug!(type_name = %type_name, instance = %key, "persist");
        Ok(key)
    }

    /// Schedules a managed root for deletion at the next flush. A root that
    /// was never inserted is simply forgotten. Once deleted, an instance is
    /// not written again through references that still point at it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the root is not managed.
    pub fn remove(&mut self, handle: &DocHandle) -> CoreResult<()> {
        let key = handle.key();
        if !self.identity.contains(key) {
            return Err(CoreError::invalid_operation(format!(
                "{key} is not managed by this unit of work"
            )));
        }
        if handle.id().is_none() {
            self.detach(handle);
        } else if !self.removals.contains(&key) {
            self.removals.push(key);
        }
        Ok(())
    }

    /// Stops tracking a root without touching the store.
    pub fn detach(&mut self, handle: &DocHandle) -> bool {
        let key = handle.key();
        self.removals.retain(|k| *k != key);
        self.baselines.remove(key);
        self.identity.forget(key).is_some()
    }

    /// Returns true if the root is managed.
    #[must_use]
    pub fn contains(&self, handle: &DocHandle) -> bool {
        self.identity.contains(handle.key())
    }

    /// Returns true if the root is scheduled for deletion.
    #[must_use]
    pub fn is_scheduled_for_removal(&self, handle: &DocHandle) -> bool {
        self.removals.contains(&handle.key())
    }

    /// Number of managed roots.
    #[must_use]
    pub fn managed_count(&self) -> usize {
        self.identity.len()
    }

    /// Managed root for a stored identity, without reading the store.
    #[must_use]
    pub fn lookup(&self, type_name: &str, id: DocumentId) -> Option<DocHandle> {
        self.identity.lookup(type_name, id)
    }

    /// Baseline of a managed root.
    #[must_use]
    pub fn baseline(&self, handle: &DocHandle) -> Option<&Snapshot> {
        self.baselines.get(handle.key())
    }

    /// Field-level changes of a managed root since its baseline.
    ///
    /// Returns `None` for a root without a baseline, which the next flush
    /// writes in full. Unlike [`compute_changes`](Self::compute_changes),
    /// nothing is registered.
    ///
    /// # Errors
    ///
    /// Fails if the root does not fit the schema.
    pub fn diff_against_baseline(&self, handle: &DocHandle) -> CoreResult<Option<Vec<FieldDelta>>> {
        let Some(baseline) = self.baselines.get(handle.key()) else {
            return Ok(None);
        };
        let current = Snapshot::capture(handle, &self.schema, self.config.max_embed_depth)?;
        Ok(Some(diff(baseline, &current)))
    }

    /// Finds a root by identifier, consulting the identity map first.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read or the document does not
    /// materialize.
    pub fn find(&mut self, type_name: &str, id: DocumentId) -> CoreResult<Option<DocHandle>> {
        if let Some(existing) = self.identity.lookup(type_name, id) {
            return Ok(Some(existing));
        }
        let collection = self.schema.collection_of(type_name)?.to_string();
        match self.store.find_by_id(&collection, id)? {
            Some(document) => self.hydrate(type_name, &document).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`find`](Self::find), but a missing document is an error.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIdentity` if nothing is stored under `id`.
    pub fn get(&mut self, type_name: &str, id: DocumentId) -> CoreResult<DocHandle> {
        self.find(type_name, id)?
            .ok_or_else(|| CoreError::unknown_identity(type_name, id))
    }

    /// Materializes the first stored root matching `filter`.
    ///
    /// If that document is already managed, the managed instance is
    /// returned as-is, unflushed changes included.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read or the document does not
    /// materialize.
    pub fn find_one(&mut self, type_name: &str, filter: &Filter) -> CoreResult<Option<DocHandle>> {
        let collection = self.schema.collection_of(type_name)?.to_string();
        match self.store.find_one(&collection, filter)? {
            Some(document) => self.hydrate(type_name, &document).map(Some),
            None => Ok(None),
        }
    }

    /// Materializes a stored document as a managed root.
    ///
    /// # Errors
    ///
    /// Returns `MaterializationMismatch` if the document does not fit the
    /// schema, or any error from resolving eager references.
    pub fn hydrate(&mut self, type_name: &str, document: &Document) -> CoreResult<DocHandle> {
        self.materializer().hydrate(type_name, document)
    }

    /// Resolves a reference-one field, loading the target if needed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIdentity` for a dangling reference.
    pub fn resolve_reference(&mut self, handle: &DocHandle, field: &str) -> CoreResult<Option<DocHandle>> {
        Ok(self.materializer().load_field(handle, field)?.into_iter().next())
    }

    /// Resolves every reference of a reference field, in order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIdentity` for a dangling reference.
    pub fn resolve_references(&mut self, handle: &DocHandle, field: &str) -> CoreResult<Vec<DocHandle>> {
        self.materializer().load_field(handle, field)
    }

    /// Serializes a root as it would be written now.
    ///
    /// # Errors
    ///
    /// Fails if the root references an unsaved instance or does not fit
    /// the schema.
    pub fn serialize(&self, handle: &DocHandle) -> CoreResult<Document> {
        let provisional = HashMap::new();
        let writer = DocumentWriter::new(&self.schema, self.config.max_embed_depth, &provisional);
        let mut document = writer.write_root(handle)?.document;
        if let Some(id) = handle.id() {
            document.set_id(id);
        }
        Ok(document)
    }

    /// Computes change trees for all managed roots, registering unsaved
    /// referenced instances along the way.
    ///
    /// # Errors
    ///
    /// Fails if an instance does not fit the schema.
    pub fn compute_changes(&mut self) -> CoreResult<Vec<ChangeTree>> {
        let skip: Vec<_> = self.removals.iter().chain(&self.deleted).copied().collect();
        ChangeEngine::new(&self.schema, &self.config).compute(
            &mut self.identity,
            &self.baselines,
            &skip,
        )
    }

    /// Computes and plans the next flush without writing anything.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvableCycle` if the plan cannot be ordered.
    pub fn plan(&mut self) -> CoreResult<Vec<Operation>> {
        let trees = self.compute_changes()?;
        Planner::new(&self.schema, &self.config, self.store.id_assignment()).plan(
            &trees,
            &self.identity,
            &self.removals,
        )
    }

    /// Writes all pending changes.
    ///
    /// # Errors
    ///
    /// See [`flush_with`](Self::flush_with).
    pub fn flush(&mut self) -> CoreResult<FlushReport> {
        self.flush_with(&CancelFlag::new())
    }

    /// Writes all pending changes, stopping between operations once
    /// `cancel` is set.
    ///
    /// Operations run in plan order. Each root the store confirms is
    /// re-baselined, so a failed or cancelled flush can be retried and
    /// only the remainder is written again.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvableCycle` before anything is written, or
    /// `StoreOperationFailed` for the first rejected operation. Operations
    /// applied before a failure stay applied. An insert whose stored id is
    /// already held by another managed instance stays applied too, and the
    /// flush stops with `InvalidOperation` naming that id.
    pub fn flush_with(&mut self, cancel: &CancelFlag) -> CoreResult<FlushReport> {
        let operations = self.plan()?;
        let mut report = FlushReport {
            planned: operations.len(),
            ..FlushReport::default()
        };
        if operations.is_empty() {
            return Ok(report);
        }

        let mut remap: HashMap<DocumentId, DocumentId> = HashMap::new();
        let mut confirmed = Vec::with_capacity(operations.len());
        for operation in operations {
            if cancel.is_cancelled() {
                info!(
                    applied = report.applied.len(),
                    planned = report.planned,
                    "flush cancelled"
                );
                report.cancelled = true;
                break;
            }
            match self.apply(operation, &mut remap) {
                Ok(applied) => {
                    confirmed.push(applied.instance);
                    report.applied.push(applied);
                }
                Err(err) => {
                    warn!(error = %err, applied = report.applied.len(), "flush failed");
                    if let Err(rebaseline) = self.rebaseline(&confirmed) {
                        warn!(error = %rebaseline, "could not re-baseline confirmed roots");
                    }
                    return Err(err);
                }
            }
        }

        self.rebaseline(&confirmed)?;
        debug!(applied = report.applied.len(), "flush complete");
        Ok(report)
    }

    /// Forgets every managed root and baseline.
    pub fn clear(&mut self) {
        debug!(managed = self.identity.len(), "clearing unit of work");
        self.identity.clear();
        self.baselines.clear();
        self.removals.clear();
        self.deleted.clear();
    }

    fn materializer(&mut self) -> Materializer<'_> {
        Materializer {
            schema: &self.schema,
            config: &self.config,
            store: self.store.as_ref(),
            identity: &mut self.identity,
            baselines: &mut self.baselines,
        }
    }

    fn apply(
        &mut self,
        operation: Operation,
        remap: &mut HashMap<DocumentId, DocumentId>,
    ) -> CoreResult<AppliedOperation> {
        let Operation {
            kind,
            collection,
            instance,
            id,
            payload,
            ..
        } = operation;
        let mut payload = payload.unwrap_or_default();
        if !remap.is_empty() {
            payload.map_ids(&mut |old| remap.get(&old).copied().unwrap_or(old));
        }
        let failed = |source| CoreError::store_operation_failed(kind, collection.as_str(), source);

        let stored_id = match kind {
            OperationKind::Insert => {
                let stored_id = self.store.insert(&collection, payload).map_err(failed)?;
                if stored_id != id {
                    remap.insert(id, stored_id);
                }
                if let Some(handle) = self.identity.get(instance).cloned() {
                    handle.write().set_id(stored_id);
                    if let Err(err) = self.identity.register(&handle) {
                        self.rebaseline(&[instance])?;
                        return Err(CoreError::invalid_operation(format!(
                            "{collection} document {stored_id} was inserted but cannot be tracked: {err}"
                        )));
                    }
                }
                stored_id
            }
            OperationKind::Replace => {
                self.store.replace(&collection, id, payload).map_err(failed)?;
                id
            }
            OperationKind::Delete => {
                self.store.delete(&collection, id).map_err(failed)?;
                self.removals.retain(|k| *k != instance);
                self.baselines.remove(instance);
                self.identity.forget(instance);
                self.deleted.push(instance);
                id
            }
        };

        debug!(%kind, collection = %collection, id = %stored_id, "applied");
        Ok(AppliedOperation {
            kind,
            collection,
            instance,
            id: stored_id,
        })
    }

    fn rebaseline(&mut self, keys: &[InstanceKey]) -> CoreResult<()> {
        for key in keys {
            let Some(handle) = self.identity.get(*key) else {
                continue;
            };
            let snapshot = Snapshot::capture(handle, &self.schema, self.config.max_embed_depth)?;
            self.baselines.insert(snapshot);
        }
        Ok(())
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("managed", &self.identity.len())
            .field("baselines", &self.baselines.len())
            .field("removals", &self.removals.len())
            .field("deleted", &self.deleted.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
