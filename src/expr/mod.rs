//! Expression data consumed by the canonicalizer.
//!
//! This module provides the data shapes the canonicalizer reads:
//! - `Shape` - two-dimensional shape information
//! - `Variable` and `VariableBuilder` - declared variables and their declarations
//! - `AffineExpr` - per-variable sparse coefficient blocks plus a constant
//! - `QuadExpr` - bilinear blocks over variable pairs plus an affine part

pub mod affine;
pub mod quad;
pub mod shape;
pub mod variable;

// Re-export main types
pub use affine::AffineExpr;
pub use quad::QuadExpr;
pub use shape::Shape;
pub use variable::{packed_index, BoundSpec, VarKind, Variable, VariableBuilder};
