//! Symbolic model bookkeeping.

pub mod table;

pub use table::VariableTable;
