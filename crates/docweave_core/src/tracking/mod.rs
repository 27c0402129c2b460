//! Change tracking.
//!
//! - [`IdentityMap`]: one in-memory instance per stored document
//! - [`SnapshotStore`]: last persisted state of each managed root
//! - [`ChangeEngine`]: per-root [`ChangeTree`]s from baseline vs current

mod change;
mod identity;
mod snapshot;

pub use change::{diff, ChangeEngine, ChangeTree, FieldDelta};
pub use identity::IdentityMap;
pub use snapshot::{ComposedState, Snapshot, SnapshotStore};

pub(crate) use snapshot::check_target;
