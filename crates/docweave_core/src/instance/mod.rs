//! In-memory instances.
//!
//! Instances form a graph: embed fields own their children, reference
//! fields point at other roots. Each instance sits behind a [`DocHandle`]
//! so that parents, references, and the unit of work can share it.

mod handle;
mod reference;

pub use handle::{DocHandle, FieldValue, Instance, InstanceKey, WeakDocHandle};
pub use reference::{RefIdentity, Reference};
