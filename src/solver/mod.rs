//! Standard-form assembly, backend sessions and the Clarabel adapter.

pub mod clarabel;
pub mod session;
pub mod standard_form;

pub use self::clarabel::{solve, Solution, SolveStatus};
pub use session::{Backend, BackendSession};
pub use standard_form::{
    Block, ConeBlock, ConeKind, LogSumExpBlock, ObjectiveBlock, QuadBlock, RowBlock, SdpBlock,
    StandardForm,
};
