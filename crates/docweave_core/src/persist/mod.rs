//! Persistence planning.

mod operation;
mod planner;
mod serialize;

pub use operation::{Operation, OperationKind};
pub use planner::Planner;

pub(crate) use serialize::DocumentWriter;
