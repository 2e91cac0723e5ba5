//! Affine expressions in coefficient-block form.
//!
//! An affine expression is `sum_v B_v * x_v + c`, where `x_v` is the flat
//! slice of variable `v` and `B_v` is a sparse block of shape
//! `(expression size x variable width)`. The expression is vectorized
//! column-major, so a `(m, n)` expression has `m * n` block rows.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;

use super::shape::Shape;
use super::variable::{VarKind, Variable};
use crate::error::{CanonError, Result};
use crate::model::VariableTable;
use crate::sparse::{
    csc_add, csc_from_triplets, csc_neg, csc_repeat_rows, csc_scale, dense_sparse_matmul,
};

/// An affine expression: `sum_v B_v * x_v + c`.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineExpr {
    /// Coefficient block per variable name.
    pub coeffs: BTreeMap<String, CscMatrix<f64>>,
    /// Constant term; `None` means zero.
    pub constant: Option<DMatrix<f64>>,
    /// Output shape of this expression.
    pub shape: Shape,
}

impl AffineExpr {
    /// Create a zero expression with the given shape.
    pub fn zeros(shape: impl Into<Shape>) -> Self {
        AffineExpr {
            coeffs: BTreeMap::new(),
            constant: None,
            shape: shape.into(),
        }
    }

    /// Create a constant expression.
    pub fn constant(value: DMatrix<f64>) -> Self {
        let shape = Shape::matrix(value.nrows(), value.ncols());
        AffineExpr {
            coeffs: BTreeMap::new(),
            constant: Some(value),
            shape,
        }
    }

    /// Create a constant column vector.
    pub fn constant_vec(values: Vec<f64>) -> Self {
        let n = values.len();
        Self::constant(DMatrix::from_vec(n, 1, values))
    }

    /// Create a scalar constant.
    pub fn scalar(value: f64) -> Self {
        Self::constant(DMatrix::from_element(1, 1, value))
    }

    /// The expression equal to a declared variable.
    ///
    /// Symmetric variables expand their packed slots into all `n^2` entries.
    pub fn variable(var: &Variable) -> Self {
        let shape = var.shape();
        let block = match var.kind() {
            VarKind::Symmetric => {
                let n = shape.rows();
                let triplets = (0..n).flat_map(move |j| {
                    (0..n).map(move |i| (shape.flat_index(i, j), var.slot(i, j), 1.0))
                });
                csc_from_triplets(shape.size(), var.width(), triplets)
            }
            _ => CscMatrix::identity(shape.size()),
        };
        let mut coeffs = BTreeMap::new();
        coeffs.insert(var.name().to_string(), block);
        AffineExpr {
            coeffs,
            constant: None,
            shape,
        }
    }

    /// Scalar expression for one element of a variable.
    pub fn element(var: &Variable, i: usize, j: usize) -> Result<Self> {
        AffineExpr::variable(var).entry(i, j)
    }

    /// Constant term as a dense matrix (zeros if absent).
    pub fn constant_value(&self) -> DMatrix<f64> {
        self.constant
            .clone()
            .unwrap_or_else(|| DMatrix::zeros(self.shape.rows(), self.shape.cols()))
    }

    /// Check if this is a constant (no variables).
    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Get the output size (flattened).
    pub fn size(&self) -> usize {
        self.shape.size()
    }

    /// Names of the variables this expression references, sorted.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.coeffs.keys().map(String::as_str)
    }

    /// Add a coefficient block for a variable, summing with any existing one.
    pub fn with_term(mut self, name: impl Into<String>, block: CscMatrix<f64>) -> Result<Self> {
        if block.nrows() != self.size() {
            return Err(CanonError::shape(
                format!("{} block rows", self.size()),
                block.nrows().to_string(),
            ));
        }
        let name = name.into();
        let merged = match self.coeffs.get(&name) {
            Some(existing) => csc_add(existing, &block),
            None => block,
        };
        self.coeffs.insert(name, merged);
        Ok(self)
    }

    /// Replace the constant term.
    pub fn with_constant(mut self, constant: DMatrix<f64>) -> Result<Self> {
        if constant.nrows() != self.shape.rows() || constant.ncols() != self.shape.cols() {
            return Err(CanonError::shape(
                self.shape.to_string(),
                format!("({}, {})", constant.nrows(), constant.ncols()),
            ));
        }
        self.constant = Some(constant);
        Ok(self)
    }

    /// Broadcast a scalar expression to `shape`; other shapes must match exactly.
    pub fn broadcast_to(&self, shape: Shape) -> Result<AffineExpr> {
        if self.shape == shape {
            return Ok(self.clone());
        }
        if !self.shape.is_scalar() {
            return Err(CanonError::shape(shape.to_string(), self.shape.to_string()));
        }
        let size = shape.size();
        let coeffs = self
            .coeffs
            .iter()
            .map(|(k, v)| (k.clone(), csc_repeat_rows(v, size)))
            .collect();
        let constant = self
            .constant
            .as_ref()
            .map(|c| DMatrix::from_element(shape.rows(), shape.cols(), c[(0, 0)]));
        Ok(AffineExpr {
            coeffs,
            constant,
            shape,
        })
    }

    /// Add two affine expressions. A scalar operand broadcasts.
    pub fn add(&self, other: &AffineExpr) -> Result<AffineExpr> {
        let shape = if self.shape == other.shape || other.shape.is_scalar() {
            self.shape
        } else if self.shape.is_scalar() {
            other.shape
        } else {
            return Err(CanonError::shape(self.shape.to_string(), other.shape.to_string()));
        };
        let lhs = self.broadcast_to(shape)?;
        let rhs = other.broadcast_to(shape)?;

        let mut coeffs = lhs.coeffs;
        for (name, coeff) in rhs.coeffs {
            coeffs
                .entry(name)
                .and_modify(|c| *c = csc_add(c, &coeff))
                .or_insert(coeff);
        }
        let constant = match (lhs.constant, rhs.constant) {
            (Some(a), Some(b)) => Some(a + b),
            (a, None) => a,
            (None, b) => b,
        };
        Ok(AffineExpr {
            coeffs,
            constant,
            shape,
        })
    }

    /// Subtract two affine expressions.
    pub fn sub(&self, other: &AffineExpr) -> Result<AffineExpr> {
        self.add(&other.neg())
    }

    /// Negate an affine expression.
    pub fn neg(&self) -> AffineExpr {
        AffineExpr {
            coeffs: self
                .coeffs
                .iter()
                .map(|(k, v)| (k.clone(), csc_neg(v)))
                .collect(),
            constant: self.constant.as_ref().map(|c| -c),
            shape: self.shape,
        }
    }

    /// Scale by a scalar.
    pub fn scale(&self, scalar: f64) -> AffineExpr {
        AffineExpr {
            coeffs: self
                .coeffs
                .iter()
                .map(|(k, v)| (k.clone(), csc_scale(v, scalar)))
                .collect(),
            constant: self.constant.as_ref().map(|c| c * scalar),
            shape: self.shape,
        }
    }

    /// Apply a linear map to the vectorized expression: `L * vec(self)`.
    ///
    /// `l` must have `self.size()` columns and `shape.size()` rows.
    pub fn linear_map(&self, l: &DMatrix<f64>, shape: Shape) -> Result<AffineExpr> {
        if l.ncols() != self.size() || l.nrows() != shape.size() {
            return Err(CanonError::shape(
                format!("({}, {})", shape.size(), self.size()),
                format!("({}, {})", l.nrows(), l.ncols()),
            ));
        }
        let coeffs = self
            .coeffs
            .iter()
            .map(|(k, v)| (k.clone(), dense_sparse_matmul(l, v)))
            .collect();
        let constant = self.constant.as_ref().map(|c| {
            let flat = DVector::from_column_slice(c.as_slice());
            let mapped = l * flat;
            DMatrix::from_column_slice(shape.rows(), shape.cols(), mapped.as_slice())
        });
        Ok(AffineExpr {
            coeffs,
            constant,
            shape,
        })
    }

    /// Left matrix product `A * self`.
    pub fn matmul_left(&self, a: &DMatrix<f64>) -> Result<AffineExpr> {
        if a.ncols() != self.shape.rows() {
            return Err(CanonError::shape(
                format!("{} columns", self.shape.rows()),
                a.ncols().to_string(),
            ));
        }
        // vec(A E) = (I_n kron A) vec(E)
        let n = self.shape.cols();
        let l = DMatrix::<f64>::identity(n, n).kronecker(a);
        self.linear_map(&l, Shape::matrix(a.nrows(), n))
    }

    /// Sum of all entries.
    pub fn sum(&self) -> AffineExpr {
        let ones = DMatrix::from_element(1, self.size(), 1.0);
        self.linear_map(&ones, Shape::scalar())
            .unwrap_or_else(|_| AffineExpr::zeros(Shape::scalar()))
    }

    /// Scalar expression for entry `(i, j)`.
    pub fn entry(&self, i: usize, j: usize) -> Result<AffineExpr> {
        if i >= self.shape.rows() || j >= self.shape.cols() {
            return Err(CanonError::shape(
                format!("index within {}", self.shape),
                format!("({}, {})", i, j),
            ));
        }
        let mut selector = DMatrix::zeros(1, self.size());
        selector[(0, self.shape.flat_index(i, j))] = 1.0;
        self.linear_map(&selector, Shape::scalar())
    }

    /// Inner product with a constant of the same shape (Frobenius for matrices).
    pub fn inner(&self, m: &DMatrix<f64>) -> Result<AffineExpr> {
        if m.nrows() != self.shape.rows() || m.ncols() != self.shape.cols() {
            return Err(CanonError::shape(
                self.shape.to_string(),
                format!("({}, {})", m.nrows(), m.ncols()),
            ));
        }
        let row = DMatrix::from_row_slice(1, m.len(), m.as_slice());
        self.linear_map(&row, Shape::scalar())
    }

    /// Dot product of a vector expression with constant weights.
    pub fn dot(&self, weights: &[f64]) -> Result<AffineExpr> {
        self.inner(&DMatrix::from_column_slice(weights.len(), 1, weights))
    }

    /// Scalar expression times a constant matrix.
    pub fn times_matrix(&self, m: &DMatrix<f64>) -> Result<AffineExpr> {
        if !self.shape.is_scalar() {
            return Err(CanonError::shape("(1, 1)", self.shape.to_string()));
        }
        let column = DMatrix::from_column_slice(m.len(), 1, m.as_slice());
        self.linear_map(&column, Shape::matrix(m.nrows(), m.ncols()))
    }

    /// Stack column-vector expressions vertically.
    ///
    /// Each part's block rows are shifted by the rows stacked before it.
    pub fn vstack(parts: &[&AffineExpr]) -> Result<AffineExpr> {
        if let Some(bad) = parts.iter().find(|p| p.shape.cols() != 1) {
            return Err(CanonError::shape("column vector", bad.shape.to_string()));
        }
        let total: usize = parts.iter().map(|p| p.size()).sum();
        let mut blocks: BTreeMap<String, (usize, Vec<(usize, usize, f64)>)> = BTreeMap::new();
        let mut constant: Option<DMatrix<f64>> = None;
        let mut offset = 0;
        for part in parts {
            for (name, block) in &part.coeffs {
                let (width, triplets) = blocks
                    .entry(name.clone())
                    .or_insert_with(|| (block.ncols(), Vec::new()));
                if *width != block.ncols() {
                    return Err(CanonError::shape(
                        format!("width {} for {}", width, name),
                        block.ncols().to_string(),
                    ));
                }
                triplets.extend(block.triplet_iter().map(|(r, c, v)| (offset + r, c, *v)));
            }
            if let Some(c) = &part.constant {
                let stacked = constant.get_or_insert_with(|| DMatrix::zeros(total, 1));
                for (k, v) in c.iter().enumerate() {
                    stacked[(offset + k, 0)] = *v;
                }
            }
            offset += part.size();
        }
        let coeffs = blocks
            .into_iter()
            .map(|(name, (width, triplets))| (name, csc_from_triplets(total, width, triplets)))
            .collect();
        Ok(AffineExpr {
            coeffs,
            constant,
            shape: Shape::vector(total),
        })
    }

    /// Evaluate at a flat assignment of the variable table.
    pub fn evaluate(&self, table: &VariableTable, x: &[f64]) -> Result<DMatrix<f64>> {
        let mut flat = DVector::from_column_slice(self.constant_value().as_slice());
        for (name, block) in &self.coeffs {
            let var = table.require(name)?;
            let slice = &x[var.start()..var.end()];
            for (r, c, v) in block.triplet_iter() {
                flat[r] += *v * slice[c];
            }
        }
        Ok(DMatrix::from_column_slice(
            self.shape.rows(),
            self.shape.cols(),
            flat.as_slice(),
        ))
    }
}

impl From<f64> for AffineExpr {
    fn from(value: f64) -> Self {
        AffineExpr::scalar(value)
    }
}
