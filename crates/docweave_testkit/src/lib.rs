//! # docweave Testkit
//!
//! Test utilities for docweave.
//!
//! This crate provides:
//! - Fixture schemas and typed wrappers (orders, categories, hierarchies)
//! - Sessions over an in-memory store
//! - A fault-injecting store for partial-flush tests
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use docweave_testkit::prelude::*;
//!
//! let mut session = TestSession::new();
//! let (order, _product) = order_with_product("Order", "Product");
//! session.persist(&order).unwrap();
//! session.flush().unwrap();
//! assert_eq!(session.stored("orders").len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

use docweave_codec::Document;
use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::{init_tracing, to_json};
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Renders a document as JSON, for readable assertions and failure output.
pub fn to_json(document: &Document) -> serde_json::Value {
    serde_json::to_value(document).expect("documents always serialize")
}
