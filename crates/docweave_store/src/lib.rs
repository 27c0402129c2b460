//! # docweave Store
//!
//! The store collaborator contract for docweave and an in-memory
//! implementation.
//!
//! The persistence core never talks to a database directly. It issues
//! inserts, replaces and deletes against a [`DocumentStore`] in the order it
//! planned them, and reads documents back through `find_one` / `find_by_id`.
//!
//! ## Design Principles
//!
//! - Stores are schemaless document containers keyed by collection and id
//! - No knowledge of embedding, references or change tracking
//! - Each call stands alone; there is no multi-document atomicity
//! - Must be `Send + Sync`
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For tests and ephemeral sessions
//!
//! ## Example
//!
//! ```rust
//! use docweave_codec::Document;
//! use docweave_store::{DocumentStore, Filter, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.insert("hierarchy", Document::new().with("name", "Root")).unwrap();
//! let root = store
//!     .find_one("hierarchy", &Filter::all().eq("name", "Root"))
//!     .unwrap();
//! assert!(root.is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, JournalEntry, WriteKind};
pub use store::{DocumentStore, Filter, IdAssignment};
