//! Constraints and their ordered store.

pub mod constraint;
pub mod store;

pub use constraint::{Constraint, ConstraintExt, ConstraintKind, LinearSense, SdpSense};
pub use store::{
    Batch, ConstraintHandle, ConstraintIndex, ConstraintStore, ConstraintTotals, GroupDescriptor,
    StoredConstraint,
};
