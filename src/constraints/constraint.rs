//! Constraint types for optimization problems.
//!
//! Constraints map to blocks of the standard form:
//! - Linear: equality or inequality rows
//! - SecondOrderCone / RotatedCone: one second-order cone block each
//! - Semidefinite: one symmetric cone block
//! - Quadratic: one inequality row plus a bilinear matrix
//! - LogSumExp: passed through for backends with native support

use std::collections::BTreeSet;

use crate::error::{CanonError, Result};
use crate::expr::{AffineExpr, QuadExpr, Shape};

/// Relation of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinearSense {
    Eq,
    Le,
    Ge,
}

/// Relation of a semidefinite constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdpSense {
    /// `lhs ⪯ rhs`
    Preceq,
    /// `lhs ⪰ rhs`
    Succeq,
}

/// Coarse constraint category used for the running totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Linear,
    Cone,
    Quadratic,
    Semidefinite,
    LogSumExp,
}

/// A constraint in an optimization problem.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// `lhs (==|<=|>=) rhs`, both sides of the same shape.
    Linear {
        lhs: AffineExpr,
        rhs: AffineExpr,
        sense: LinearSense,
    },

    /// Second-order cone constraint: `||arg||_2 <= bound`.
    SecondOrderCone {
        /// The vector argument.
        arg: AffineExpr,
        /// The scalar upper bound.
        bound: AffineExpr,
    },

    /// Rotated cone: `||arg||^2 <= bound1 * bound2`.
    ///
    /// An absent bound stands for the constant 1; at least one is present.
    RotatedCone {
        arg: AffineExpr,
        bound1: Option<AffineExpr>,
        bound2: Option<AffineExpr>,
    },

    /// `lhs ⪯ rhs` or `lhs ⪰ rhs` on square matrices of equal shape.
    Semidefinite {
        lhs: AffineExpr,
        rhs: AffineExpr,
        sense: SdpSense,
    },

    /// `expr <= 0` for a quadratic expression.
    Quadratic { expr: QuadExpr },

    /// `log(sum(exp(arg))) <= bound`.
    LogSumExp { arg: AffineExpr, bound: AffineExpr },
}

impl Constraint {
    fn linear(lhs: AffineExpr, rhs: AffineExpr, sense: LinearSense) -> Result<Self> {
        let shape = if lhs.shape == rhs.shape || rhs.shape.is_scalar() {
            lhs.shape
        } else if lhs.shape.is_scalar() {
            rhs.shape
        } else {
            return Err(CanonError::shape(lhs.shape.to_string(), rhs.shape.to_string()));
        };
        Ok(Constraint::Linear {
            lhs: lhs.broadcast_to(shape)?,
            rhs: rhs.broadcast_to(shape)?,
            sense,
        })
    }

    /// Create an equality constraint: lhs == rhs.
    pub fn eq(lhs: AffineExpr, rhs: AffineExpr) -> Result<Self> {
        Self::linear(lhs, rhs, LinearSense::Eq)
    }

    /// Create an inequality constraint: lhs <= rhs.
    pub fn leq(lhs: AffineExpr, rhs: AffineExpr) -> Result<Self> {
        Self::linear(lhs, rhs, LinearSense::Le)
    }

    /// Create an inequality constraint: lhs >= rhs.
    pub fn geq(lhs: AffineExpr, rhs: AffineExpr) -> Result<Self> {
        Self::linear(lhs, rhs, LinearSense::Ge)
    }

    /// Create a SOC constraint: ||arg||_2 <= bound.
    pub fn soc(arg: AffineExpr, bound: AffineExpr) -> Result<Self> {
        if !bound.shape.is_scalar() {
            return Err(CanonError::shape("scalar cone bound", bound.shape.to_string()));
        }
        Ok(Constraint::SecondOrderCone { arg, bound })
    }

    /// Create a rotated cone constraint: ||arg||^2 <= bound1 * bound2.
    pub fn rotated(
        arg: AffineExpr,
        bound1: Option<AffineExpr>,
        bound2: Option<AffineExpr>,
    ) -> Result<Self> {
        if bound1.is_none() && bound2.is_none() {
            return Err(CanonError::shape(
                "at least one rotated cone bound",
                "both absent",
            ));
        }
        for b in bound1.iter().chain(bound2.iter()) {
            if !b.shape.is_scalar() {
                return Err(CanonError::shape("scalar cone bound", b.shape.to_string()));
            }
        }
        Ok(Constraint::RotatedCone {
            arg,
            bound1,
            bound2,
        })
    }

    fn semidefinite(lhs: AffineExpr, rhs: AffineExpr, sense: SdpSense) -> Result<Self> {
        if !lhs.shape.is_square() {
            return Err(CanonError::shape("square matrix", lhs.shape.to_string()));
        }
        if lhs.shape != rhs.shape {
            return Err(CanonError::shape(lhs.shape.to_string(), rhs.shape.to_string()));
        }
        Ok(Constraint::Semidefinite { lhs, rhs, sense })
    }

    /// Create a semidefinite constraint: lhs ⪯ rhs.
    pub fn preceq(lhs: AffineExpr, rhs: AffineExpr) -> Result<Self> {
        Self::semidefinite(lhs, rhs, SdpSense::Preceq)
    }

    /// Create a semidefinite constraint: lhs ⪰ rhs.
    pub fn succeq(lhs: AffineExpr, rhs: AffineExpr) -> Result<Self> {
        Self::semidefinite(lhs, rhs, SdpSense::Succeq)
    }

    /// Create `expr ⪰ 0`.
    pub fn psd(expr: AffineExpr) -> Result<Self> {
        let zero = AffineExpr::zeros(expr.shape);
        Self::succeq(expr, zero)
    }

    /// Create a quadratic constraint: lhs <= rhs.
    pub fn quad_leq(lhs: QuadExpr, rhs: QuadExpr) -> Result<Self> {
        let expr = lhs.sub(&rhs)?;
        if !expr.affine.shape.is_scalar() {
            return Err(CanonError::shape("scalar quadratic", expr.affine.shape.to_string()));
        }
        Ok(Constraint::Quadratic { expr })
    }

    /// Create a log-sum-exp constraint: log(sum(exp(arg))) <= bound.
    pub fn log_sum_exp(arg: AffineExpr, bound: AffineExpr) -> Result<Self> {
        if !bound.shape.is_scalar() {
            return Err(CanonError::shape("scalar bound", bound.shape.to_string()));
        }
        Ok(Constraint::LogSumExp { arg, bound })
    }

    /// Coarse category of this constraint.
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Constraint::Linear { .. } => ConstraintKind::Linear,
            Constraint::SecondOrderCone { .. } | Constraint::RotatedCone { .. } => {
                ConstraintKind::Cone
            }
            Constraint::Semidefinite { .. } => ConstraintKind::Semidefinite,
            Constraint::Quadratic { .. } => ConstraintKind::Quadratic,
            Constraint::LogSumExp { .. } => ConstraintKind::LogSumExp,
        }
    }

    /// Shape of the constrained expression (the cone argument for cones).
    pub fn shape(&self) -> Shape {
        match self {
            Constraint::Linear { lhs, .. } | Constraint::Semidefinite { lhs, .. } => lhs.shape,
            Constraint::SecondOrderCone { arg, .. }
            | Constraint::RotatedCone { arg, .. }
            | Constraint::LogSumExp { arg, .. } => arg.shape,
            Constraint::Quadratic { .. } => Shape::scalar(),
        }
    }

    /// Get all affine expressions in this constraint.
    pub fn expressions(&self) -> Vec<&AffineExpr> {
        match self {
            Constraint::Linear { lhs, rhs, .. } | Constraint::Semidefinite { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            Constraint::SecondOrderCone { arg, bound } | Constraint::LogSumExp { arg, bound } => {
                vec![arg, bound]
            }
            Constraint::RotatedCone {
                arg,
                bound1,
                bound2,
            } => std::iter::once(arg)
                .chain(bound1.iter())
                .chain(bound2.iter())
                .collect(),
            Constraint::Quadratic { expr } => vec![&expr.affine],
        }
    }

    /// Get all variable names in this constraint.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut vars: BTreeSet<&str> = self
            .expressions()
            .into_iter()
            .flat_map(|e| e.variables())
            .collect();
        if let Constraint::Quadratic { expr } = self {
            vars.extend(expr.variables());
        }
        vars
    }
}

/// Extension trait for creating constraints from expressions.
pub trait ConstraintExt {
    /// Create equality constraint: self == rhs.
    fn equals(&self, rhs: &AffineExpr) -> Result<Constraint>;

    /// Create inequality constraint: self <= rhs.
    fn leq(&self, rhs: &AffineExpr) -> Result<Constraint>;

    /// Create inequality constraint: self >= rhs.
    fn geq(&self, rhs: &AffineExpr) -> Result<Constraint>;
}

impl ConstraintExt for AffineExpr {
    fn equals(&self, rhs: &AffineExpr) -> Result<Constraint> {
        Constraint::eq(self.clone(), rhs.clone())
    }

    fn leq(&self, rhs: &AffineExpr) -> Result<Constraint> {
        Constraint::leq(self.clone(), rhs.clone())
    }

    fn geq(&self, rhs: &AffineExpr) -> Result<Constraint> {
        Constraint::geq(self.clone(), rhs.clone())
    }
}
