//! # cvxcanon
//!
//! Canonicalization of convex optimization models into standard conic form.
//!
//! A [`Problem`] owns a table of named, typed variables, a store of
//! constraints and an objective. Every affine expression is reduced to a
//! sparse `(G, h)` pair over the flat variable vector, and the constraints
//! are assembled into a [`StandardForm`](solver::StandardForm): equality and
//! inequality rows, second-order cone blocks, semidefinite blocks, quadratic
//! rows and log-sum-exp blocks. Each solver backend keeps its own session,
//! so repeated builds only encode what was added since the last one.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cvxcanon::prelude::*;
//!
//! let mut problem = Problem::new();
//! let x = problem.add_variable(VariableBuilder::vector("x", 2).nonneg())?;
//! problem.add_constraint(x.sum().leq(&AffineExpr::scalar(1.0))?)?;
//! problem.maximize(x.dot(&[1.0, 2.0])?)?;
//!
//! let solution = problem.solve()?;
//! println!("Optimal value: {:?}", solution.value);
//! ```
//!
//! ## Constraint families
//!
//! - **Linear**: `E1 (<= | = | >=) E2`
//! - **Second-order cone**: `||E1|| <= E2`, and rotated `||E1||^2 <= E2 E3`
//! - **Semidefinite**: `E1 <= E2` or `E1 >= E2` in the Loewner order
//! - **Quadratic**: `q1 <= q2` for quadratic expressions
//! - **Log-sum-exp**: `log(sum(exp(E1))) <= E2`
//!
//! ## Reformulations
//!
//! - [`reform::quad_to_cone`] rewrites convex quadratics as rotated cones
//! - [`reform::dualize`] builds the conic dual of a continuous problem
//!
//! ## Exports
//!
//! [`export::write`] renders a problem as CPLEX LP, SDPA sparse or CBF text,
//! chosen by file extension.
//!
//! ## Architecture
//!
//! - **Variable table** assigns contiguous flat columns in declaration order
//! - **Constraint store** keeps sequence order, groups and per-kind totals
//! - **Canonicalizer** maps expressions to `(G, h)` in column-major order
//! - **Backend sessions** append newly added constraints to a cached form
//! - **Clarabel** solves LP, QP and SOCP forms directly

pub mod canon;
pub mod config;
pub mod constraints;
pub mod error;
pub mod export;
pub mod expr;
pub mod model;
pub mod problem;
pub mod reform;
pub mod solver;
pub mod sparse;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use cvxcanon::prelude::*;
/// ```
pub mod prelude {
    // Expression types
    pub use crate::expr::{AffineExpr, QuadExpr, Shape, VarKind, Variable, VariableBuilder};

    // Constraints
    pub use crate::constraints::{
        Batch, Constraint, ConstraintExt, ConstraintHandle, ConstraintIndex, ConstraintKind,
    };

    // Problem
    pub use crate::config::Options;
    pub use crate::problem::{Objective, ObjectiveSense, Problem};

    // Solver
    pub use crate::solver::{Backend, Solution, SolveStatus, StandardForm};

    // Errors
    pub use crate::error::{CanonError, Result};
}

// Re-export main types at crate root
pub use config::Options;
pub use error::{CanonError, Result};
pub use problem::Problem;
pub use solver::{Backend, Solution, SolveStatus};
