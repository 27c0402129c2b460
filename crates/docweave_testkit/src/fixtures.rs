//! Test fixtures and session helpers.
//!
//! Provides the schemas used across docweave's tests and typed wrappers
//! around their instances.

use docweave_codec::Document;
use docweave_core::{
    Config, CoreResult, DocHandle, FieldMapping, FieldSet, SchemaRegistry, TypeSchema, UnitOfWork,
};
use docweave_store::{IdAssignment, InMemoryStore};
use std::sync::Arc;

/// Schema with every fixture type registered.
///
/// - `Order` (collection `orders`) embeds one `Product`
/// - `Product` (collection `products`) is a document type, used embedded
/// - `Category` (collection `categories`) and the embedded-only
///   `ChildCategory` share one field set: a `name` and embedded `children`
/// - `Hierarchy` (collection `hierarchy`) references its `children`
pub fn fixture_schema() -> Arc<SchemaRegistry> {
    let category_fields = FieldSet::new()
        .field(FieldMapping::scalar("name"))
        .field(FieldMapping::embed_many("children", "ChildCategory"));

    let registry = SchemaRegistry::new()
        .with(
            TypeSchema::document("Order", "orders")
                .field(FieldMapping::scalar("title"))
                .field(FieldMapping::embed_one("product", "Product")),
        )
        .and_then(|r| {
            r.with(TypeSchema::document("Product", "products").field(FieldMapping::scalar("title")))
        })
        .and_then(|r| {
            r.with(TypeSchema::document("Category", "categories").with_fields(&category_fields))
        })
        .and_then(|r| r.with(TypeSchema::embedded("ChildCategory").with_fields(&category_fields)))
        .and_then(|r| {
            r.with(
                TypeSchema::document("Hierarchy", "hierarchy")
                    .field(FieldMapping::scalar("name"))
                    .field(FieldMapping::reference_many("children", "Hierarchy")),
            )
        })
        .expect("fixture schema is valid");
    Arc::new(registry)
}

/// A unit of work over a fresh in-memory store.
pub struct TestSession {
    /// The unit of work.
    pub uow: UnitOfWork,
    /// The store, for inspecting what was written.
    pub store: Arc<InMemoryStore>,
}

impl TestSession {
    /// Session over a store that accepts client identifiers.
    pub fn new() -> Self {
        Self::build(IdAssignment::ClientAllowed, Config::default())
    }

    /// Session over a store that generates identifiers.
    pub fn with_store_ids() -> Self {
        Self::build(IdAssignment::StoreGenerated, Config::default())
    }

    /// Session with a custom configuration.
    pub fn configured(config: Config) -> Self {
        Self::build(IdAssignment::ClientAllowed, config)
    }

    fn build(id_assignment: IdAssignment, config: Config) -> Self {
        let store = Arc::new(InMemoryStore::with_id_assignment(id_assignment));
        let uow = UnitOfWork::new(fixture_schema(), store.clone(), config)
            .expect("Failed to create unit of work");
        Self { uow, store }
    }

    /// A second, independent unit of work over the same store.
    pub fn reopen(&self) -> UnitOfWork {
        UnitOfWork::new(fixture_schema(), self.store.clone(), self.uow.config().clone())
            .expect("Failed to create unit of work")
    }

    /// Every document stored in `collection`.
    pub fn stored(&self, collection: &str) -> Vec<Document> {
        self.store
            .documents(collection)
            .expect("Failed to read collection")
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestSession {
    type Target = UnitOfWork;

    fn deref(&self) -> &Self::Target {
        &self.uow
    }
}

impl std::ops::DerefMut for TestSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.uow
    }
}

/// Builds an order embedding a product.
pub fn order_with_product(title: &str, product_title: &str) -> (DocHandle, DocHandle) {
    let order = DocHandle::new("Order");
    order.set("title", title);
    let product = DocHandle::new("Product");
    product.set("title", product_title);
    order.set_embedded("product", Some(product.clone()));
    (order, product)
}

/// Named nodes that embed children of their own kind.
///
/// Implemented by both [`Category`] (a root) and [`ChildCategory`]
/// (embedded only), which share one field set.
pub trait Composable {
    /// The underlying instance.
    fn handle(&self) -> &DocHandle;

    /// Current name.
    fn name(&self) -> Option<String> {
        self.handle().get("name").as_text().map(str::to_owned)
    }

    /// Renames the node.
    fn set_name(&self, name: &str) {
        self.handle().set("name", name);
    }

    /// Embedded children, in order.
    fn children(&self) -> Vec<ChildCategory> {
        self.handle()
            .embedded_many("children")
            .into_iter()
            .map(ChildCategory)
            .collect()
    }

    /// First child called `name`.
    fn child(&self, name: &str) -> Option<ChildCategory> {
        self.children()
            .into_iter()
            .find(|c| c.name().as_deref() == Some(name))
    }

    /// Appends a new child called `name` and returns it.
    fn add_child(&self, name: &str) -> ChildCategory {
        let child = ChildCategory::new(name);
        self.handle().push_embedded("children", child.0.clone());
        child
    }
}

/// A root category.
#[derive(Debug, Clone)]
pub struct Category(pub DocHandle);

impl Category {
    /// Creates an unsaved category.
    pub fn new(name: &str) -> Self {
        let handle = DocHandle::new("Category");
        handle.set("name", name);
        Self(handle)
    }
}

impl Composable for Category {
    fn handle(&self) -> &DocHandle {
        &self.0
    }
}

/// A category embedded in another category.
#[derive(Debug, Clone)]
pub struct ChildCategory(pub DocHandle);

impl ChildCategory {
    /// Creates a detached child.
    pub fn new(name: &str) -> Self {
        let handle = DocHandle::new("ChildCategory");
        handle.set("name", name);
        Self(handle)
    }
}

impl Composable for ChildCategory {
    fn handle(&self) -> &DocHandle {
        &self.0
    }
}

/// A node whose children are separate root documents.
#[derive(Debug, Clone)]
pub struct Hierarchy(pub DocHandle);

impl Hierarchy {
    /// Creates an unsaved node.
    pub fn new(name: &str) -> Self {
        let handle = DocHandle::new("Hierarchy");
        handle.set("name", name);
        Self(handle)
    }

    /// Current name.
    pub fn name(&self) -> Option<String> {
        self.0.get("name").as_text().map(str::to_owned)
    }

    /// Appends a new child node called `name` and returns it.
    pub fn add_child(&self, name: &str) -> Hierarchy {
        let child = Hierarchy::new(name);
        self.0.push_reference("children", &child.0);
        child
    }

    /// Children, resolved through `uow`.
    pub fn children(&self, uow: &mut UnitOfWork) -> CoreResult<Vec<Hierarchy>> {
        Ok(uow
            .resolve_references(&self.0, "children")?
            .into_iter()
            .map(Hierarchy)
            .collect())
    }

    /// First child called `name`, resolved through `uow`.
    pub fn child(&self, uow: &mut UnitOfWork, name: &str) -> CoreResult<Option<Hierarchy>> {
        Ok(self
            .children(uow)?
            .into_iter()
            .find(|c| c.name().as_deref() == Some(name)))
    }
}
