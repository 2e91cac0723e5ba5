//! Numeric `(G, h)` form of affine expressions over the flat coordinate space.
//!
//! For an expression `E` of size `W`, `canonicalize` returns `G` of shape
//! `(W x total_width)` and `h` of length `W` with `vec(E(x)) = G x + h`.

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;

use crate::error::{CanonError, Result};
use crate::expr::{AffineExpr, QuadExpr};
use crate::model::VariableTable;
use crate::sparse::{csc_from_triplets, csc_triplets, try_csc_from_triplets};

/// An affine map `x -> G x + h`.
#[derive(Debug, Clone, PartialEq)]
pub struct Gh {
    pub g: CscMatrix<f64>,
    pub h: DVector<f64>,
}

impl Gh {
    /// The constant map `x -> h` over `ncols` coordinates.
    pub fn constant(h: Vec<f64>, ncols: usize) -> Self {
        Gh {
            g: CscMatrix::zeros(h.len(), ncols),
            h: DVector::from_vec(h),
        }
    }

    pub fn rows(&self) -> usize {
        self.h.len()
    }

    pub fn ncols(&self) -> usize {
        self.g.ncols()
    }

    /// Owned triplets of `G`.
    pub fn triplets(&self) -> Vec<(usize, usize, f64)> {
        csc_triplets(&self.g)
    }

    /// `self + alpha * other`, both over the same coordinates.
    pub fn axpy(&self, alpha: f64, other: &Gh) -> Result<Gh> {
        if self.rows() != other.rows() || self.ncols() != other.ncols() {
            return Err(CanonError::shape(
                format!("({}, {})", self.rows(), self.ncols()),
                format!("({}, {})", other.rows(), other.ncols()),
            ));
        }
        let triplets = self
            .g
            .triplet_iter()
            .map(|(r, c, v)| (r, c, *v))
            .chain(other.g.triplet_iter().map(|(r, c, v)| (r, c, alpha * *v)));
        Ok(Gh {
            g: csc_from_triplets(self.rows(), self.ncols(), triplets),
            h: &self.h + &other.h * alpha,
        })
    }

    /// `self - other`.
    pub fn sub(&self, other: &Gh) -> Result<Gh> {
        self.axpy(-1.0, other)
    }

    /// `alpha * self`.
    pub fn scale(&self, alpha: f64) -> Gh {
        let triplets = self.g.triplet_iter().map(|(r, c, v)| (r, c, alpha * *v));
        Gh {
            g: csc_from_triplets(self.rows(), self.ncols(), triplets),
            h: &self.h * alpha,
        }
    }

    /// Stack maps vertically.
    pub fn vstack(parts: &[&Gh]) -> Gh {
        let ncols = parts.iter().map(|p| p.ncols()).max().unwrap_or(0);
        let mut triplets = Vec::new();
        let mut h = Vec::new();
        for part in parts {
            let offset = h.len();
            triplets.extend(part.g.triplet_iter().map(|(r, c, v)| (r + offset, c, *v)));
            h.extend(part.h.iter().copied());
        }
        Gh {
            g: csc_from_triplets(h.len(), ncols, triplets),
            h: DVector::from_vec(h),
        }
    }

    /// Evaluate `G x + h`.
    pub fn evaluate(&self, x: &[f64]) -> DVector<f64> {
        let mut out = self.h.clone();
        for (r, c, v) in self.g.triplet_iter() {
            out[r] += *v * x[c];
        }
        out
    }
}

/// Canonicalize an affine expression against the current variable ranges.
pub fn canonicalize(expr: &AffineExpr, table: &VariableTable) -> Result<Gh> {
    let rows = expr.size();
    let ncols = table.total_width();
    let mut triplets = Vec::new();
    for (name, block) in &expr.coeffs {
        let var = table.require(name)?;
        if block.nrows() != rows || block.ncols() != var.width() {
            return Err(CanonError::shape(
                format!("({}, {}) block for {}", rows, var.width(), name),
                format!("({}, {})", block.nrows(), block.ncols()),
            ));
        }
        let start = var.start();
        triplets.extend(block.triplet_iter().map(|(r, c, v)| (r, start + c, *v)));
    }
    let h = DVector::from_column_slice(expr.constant_value().as_slice());
    Ok(Gh {
        g: try_csc_from_triplets(rows, ncols, triplets)?,
        h,
    })
}

/// Canonicalize a quadratic expression.
///
/// Returns the symmetric `P` with `x' P x` equal to the bilinear part, and
/// the `(1 x total_width)` map of the affine part.
pub fn canonicalize_quadratic(q: &QuadExpr, table: &VariableTable) -> Result<(CscMatrix<f64>, Gh)> {
    let n = table.total_width();
    let mut triplets = Vec::new();
    for ((u, v), block) in &q.quad {
        let vu = table.require(u)?;
        let vv = table.require(v)?;
        if block.nrows() != vu.width() || block.ncols() != vv.width() {
            return Err(CanonError::shape(
                format!("({}, {}) block for ({}, {})", vu.width(), vv.width(), u, v),
                format!("({}, {})", block.nrows(), block.ncols()),
            ));
        }
        for (r, c, val) in block.triplet_iter() {
            let (i, j) = (vu.start() + r, vv.start() + c);
            triplets.push((i, j, 0.5 * *val));
            triplets.push((j, i, 0.5 * *val));
        }
    }
    let p = try_csc_from_triplets(n, n, triplets)?;
    Ok((p, canonicalize(&q.affine, table)?))
}

/// `x' P x` for a square sparse `P`.
pub fn quad_value(p: &CscMatrix<f64>, x: &[f64]) -> f64 {
    p.triplet_iter().map(|(r, c, v)| x[r] * *v * x[c]).sum()
}
