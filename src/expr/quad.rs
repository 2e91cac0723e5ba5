//! Quadratic expressions: `sum_{u,v} x_u' Q_uv x_v + a' x + b`.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::DMatrix;
use nalgebra_sparse::CscMatrix;

use super::affine::AffineExpr;
use super::shape::Shape;
use super::variable::Variable;
use crate::error::{CanonError, Result};
use crate::model::VariableTable;
use crate::sparse::{csc_add, csc_scale, csc_to_dense, dense_to_csc, nnz_significant};

/// A scalar quadratic expression.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadExpr {
    /// Bilinear blocks: `(u, v) -> Q_uv` of shape `(width_u x width_v)`.
    pub quad: BTreeMap<(String, String), CscMatrix<f64>>,
    /// Scalar affine part.
    pub affine: AffineExpr,
}

impl QuadExpr {
    /// Create a quadratic expression from a scalar affine expression.
    pub fn from_affine(affine: AffineExpr) -> Result<Self> {
        if !affine.shape.is_scalar() {
            return Err(CanonError::shape("(1, 1)", affine.shape.to_string()));
        }
        Ok(QuadExpr {
            quad: BTreeMap::new(),
            affine,
        })
    }

    /// Create a pure quadratic term: `x' Q x` for a single variable.
    pub fn quad_form(var: &Variable, q: &DMatrix<f64>) -> Result<Self> {
        let w = var.width();
        if q.nrows() != w || q.ncols() != w {
            return Err(CanonError::shape(
                format!("({}, {})", w, w),
                format!("({}, {})", q.nrows(), q.ncols()),
            ));
        }
        let mut quad = BTreeMap::new();
        quad.insert((var.name().to_string(), var.name().to_string()), dense_to_csc(q));
        Ok(QuadExpr {
            quad,
            affine: AffineExpr::zeros(Shape::scalar()),
        })
    }

    /// `||e||^2` for an affine expression `e = sum_u B_u x_u + c`.
    pub fn sum_squares(e: &AffineExpr) -> Self {
        let c = e.constant_value();
        let c = DMatrix::from_column_slice(e.size(), 1, c.as_slice());
        let dense: BTreeMap<&String, DMatrix<f64>> =
            e.coeffs.iter().map(|(k, v)| (k, csc_to_dense(v))).collect();

        let mut quad = BTreeMap::new();
        for (u, bu) in &dense {
            for (v, bv) in &dense {
                quad.insert(((*u).clone(), (*v).clone()), dense_to_csc(&(bu.transpose() * bv)));
            }
        }

        // 2 c' B_u x_u + c'c
        let mut affine = AffineExpr::scalar(c.dot(&c));
        for (u, bu) in &dense {
            let row = (c.transpose() * bu) * 2.0;
            affine.coeffs.insert((*u).clone(), dense_to_csc(&row));
        }
        QuadExpr { quad, affine }
    }

    /// Product of two scalar affine expressions.
    pub fn product(a: &AffineExpr, b: &AffineExpr) -> Result<Self> {
        for e in [a, b] {
            if !e.shape.is_scalar() {
                return Err(CanonError::shape("(1, 1)", e.shape.to_string()));
            }
        }
        let a0 = a.constant_value()[(0, 0)];
        let b0 = b.constant_value()[(0, 0)];
        let mut quad = BTreeMap::new();
        for (u, au) in &a.coeffs {
            for (v, bv) in &b.coeffs {
                let outer = csc_to_dense(au).transpose() * csc_to_dense(bv);
                quad.insert((u.clone(), v.clone()), dense_to_csc(&outer));
            }
        }
        let affine = b
            .scale(a0)
            .add(&a.scale(b0))?
            .add(&AffineExpr::scalar(-a0 * b0))?;
        Ok(QuadExpr { quad, affine })
    }

    /// Check if this is purely affine (no quadratic terms).
    pub fn is_affine(&self) -> bool {
        self.quad.values().all(|q| nnz_significant(q) == 0)
    }

    /// Number of nonzero bilinear coefficients.
    pub fn quad_nnz(&self) -> usize {
        self.quad.values().map(nnz_significant).sum()
    }

    /// Add two quadratic expressions.
    pub fn add(&self, other: &QuadExpr) -> Result<QuadExpr> {
        let mut quad = self.quad.clone();
        for (key, coeff) in &other.quad {
            quad.entry(key.clone())
                .and_modify(|c| *c = csc_add(c, coeff))
                .or_insert_with(|| coeff.clone());
        }
        Ok(QuadExpr {
            quad,
            affine: self.affine.add(&other.affine)?,
        })
    }

    /// Subtract two quadratic expressions.
    pub fn sub(&self, other: &QuadExpr) -> Result<QuadExpr> {
        self.add(&other.scale(-1.0))
    }

    /// Add an affine term.
    pub fn add_affine(&self, other: &AffineExpr) -> Result<QuadExpr> {
        self.add(&QuadExpr::from_affine(other.clone())?)
    }

    /// Scale by a scalar.
    pub fn scale(&self, scalar: f64) -> QuadExpr {
        QuadExpr {
            quad: self
                .quad
                .iter()
                .map(|(k, v)| (k.clone(), csc_scale(v, scalar)))
                .collect(),
            affine: self.affine.scale(scalar),
        }
    }

    /// All variable names in this expression.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut vars: BTreeSet<&str> = self.affine.variables().collect();
        for (u, v) in self.quad.keys() {
            vars.insert(u.as_str());
            vars.insert(v.as_str());
        }
        vars
    }

    /// Evaluate at a flat assignment of the variable table.
    pub fn evaluate(&self, table: &VariableTable, x: &[f64]) -> Result<f64> {
        let mut value = self.affine.evaluate(table, x)?[(0, 0)];
        for ((u, v), block) in &self.quad {
            let xu = &x[table.require(u)?.start()..];
            let xv = &x[table.require(v)?.start()..];
            for (r, c, q) in block.triplet_iter() {
                value += xu[r] * *q * xv[c];
            }
        }
        Ok(value)
    }
}
