//! # docweave Core
//!
//! Change tracking and persistence planning for schema-mapped documents.
//!
//! This crate provides:
//! - Schema declarations separating embedded content from references
//! - An identity map keeping one instance per stored document
//! - Baseline snapshots and per-root change trees
//! - A planner ordering inserts, replaces and deletes
//! - A materializer turning stored documents back into instances
//! - [`UnitOfWork`], which ties them together over a
//!   [`DocumentStore`](docweave_store::DocumentStore)
//!
//! ## Embedding vs referencing
//!
//! An embedded instance is part of its owner: it is written inline, has
//! no identifier, and its changes surface in the owner's change tree. A
//! referenced instance is a root of its own: the owner stores only its
//! identifier, and its changes are written by its own operation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod hydrate;
pub mod instance;
pub mod persist;
pub mod schema;
pub mod tracking;
mod unit_of_work;

pub use config::{Config, MissingReferencePolicy};
pub use error::{CoreError, CoreResult};
pub use instance::{DocHandle, FieldValue, InstanceKey, RefIdentity, Reference};
pub use persist::{Operation, OperationKind};
pub use schema::{FieldKind, FieldMapping, FieldSet, ReferenceLoading, SchemaRegistry, TypeSchema};
pub use tracking::{ChangeTree, FieldDelta};
pub use unit_of_work::{AppliedOperation, CancelFlag, FlushReport, UnitOfWork};
