//! Canonicalization of expressions into `(G, h)` form.

pub mod gh;

pub use gh::{canonicalize, canonicalize_quadratic, quad_value, Gh};
