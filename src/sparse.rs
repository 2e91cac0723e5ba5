//! Sparse matrix utilities.
//!
//! Helpers over nalgebra-sparse CSC matrices. Coefficient blocks are small
//! and built once per rebuild, so everything here goes through triplet
//! lists and lets the COO → CSC conversion sum duplicates.

use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::error::{CanonError, Result};

/// Entries smaller than this are treated as structural zeros.
pub const DROP_TOL: f64 = 1e-15;

/// Create a CSC matrix from triplets (row, col, value).
///
/// Duplicates are summed together. Every entry must lie inside
/// `nrows x ncols`; an entry outside is an indexing bug in the caller.
pub fn csc_from_triplets(
    nrows: usize,
    ncols: usize,
    triplets: impl IntoIterator<Item = (usize, usize, f64)>,
) -> CscMatrix<f64> {
    let mut coo = CooMatrix::new(nrows, ncols);
    for (row, col, val) in triplets {
        debug_assert!(
            row < nrows && col < ncols,
            "triplet ({}, {}) outside {}x{}",
            row,
            col,
            nrows,
            ncols
        );
        if row < nrows && col < ncols {
            coo.push(row, col, val);
        }
    }
    CscMatrix::from(&coo)
}

/// Like [`csc_from_triplets`], reporting the first out-of-range entry.
pub fn try_csc_from_triplets(
    nrows: usize,
    ncols: usize,
    triplets: impl IntoIterator<Item = (usize, usize, f64)>,
) -> Result<CscMatrix<f64>> {
    let mut coo = CooMatrix::new(nrows, ncols);
    for (row, col, val) in triplets {
        if row >= nrows || col >= ncols {
            return Err(CanonError::shape(
                format!("entry within ({}, {})", nrows, ncols),
                format!("({}, {})", row, col),
            ));
        }
        coo.push(row, col, val);
    }
    Ok(CscMatrix::from(&coo))
}

/// Collect the triplets of a CSC matrix with owned values.
pub fn csc_triplets(m: &CscMatrix<f64>) -> Vec<(usize, usize, f64)> {
    m.triplet_iter().map(|(r, c, v)| (r, c, *v)).collect()
}

/// Convert a dense matrix to CSC format.
pub fn dense_to_csc(dense: &DMatrix<f64>) -> CscMatrix<f64> {
    let mut triplets = Vec::new();
    for j in 0..dense.ncols() {
        for i in 0..dense.nrows() {
            let v = dense[(i, j)];
            if v.abs() > DROP_TOL {
                triplets.push((i, j, v));
            }
        }
    }
    csc_from_triplets(dense.nrows(), dense.ncols(), triplets)
}

/// Convert CSC to dense matrix.
pub fn csc_to_dense(sparse: &CscMatrix<f64>) -> DMatrix<f64> {
    let mut dense = DMatrix::zeros(sparse.nrows(), sparse.ncols());
    for (row, col, val) in sparse.triplet_iter() {
        dense[(row, col)] += *val;
    }
    dense
}

/// Add two CSC matrices of equal shape.
pub fn csc_add(a: &CscMatrix<f64>, b: &CscMatrix<f64>) -> CscMatrix<f64> {
    let triplets = a
        .triplet_iter()
        .chain(b.triplet_iter())
        .map(|(r, c, v)| (r, c, *v));
    csc_from_triplets(a.nrows().max(b.nrows()), a.ncols().max(b.ncols()), triplets)
}

/// Scale a CSC matrix.
pub fn csc_scale(a: &CscMatrix<f64>, scalar: f64) -> CscMatrix<f64> {
    let triplets = a.triplet_iter().map(|(r, c, v)| (r, c, *v * scalar));
    csc_from_triplets(a.nrows(), a.ncols(), triplets)
}

/// Negate a CSC matrix.
pub fn csc_neg(a: &CscMatrix<f64>) -> CscMatrix<f64> {
    csc_scale(a, -1.0)
}

/// Repeat the rows of a single-row CSC matrix `times` times.
///
/// Used to broadcast a scalar expression to a vector.
pub fn csc_repeat_rows(m: &CscMatrix<f64>, times: usize) -> CscMatrix<f64> {
    let mut triplets = Vec::with_capacity(m.nnz() * times);
    for (r, c, v) in m.triplet_iter() {
        for t in 0..times {
            triplets.push((t * m.nrows() + r, c, *v));
        }
    }
    csc_from_triplets(m.nrows() * times, m.ncols(), triplets)
}

/// Dense @ Sparse multiplication, returned sparse.
///
/// Products are accumulated as triplets, so memory follows the nonzeros of
/// the result; time is `O(dense.nrows() * nnz(sparse))`.
pub fn dense_sparse_matmul(dense: &DMatrix<f64>, sparse: &CscMatrix<f64>) -> CscMatrix<f64> {
    let mut triplets = Vec::new();
    for (k, j, v) in sparse.triplet_iter() {
        for i in 0..dense.nrows() {
            let d = dense[(i, k)];
            if d != 0.0 {
                triplets.push((i, j, d * *v));
            }
        }
    }
    csc_from_triplets(dense.nrows(), sparse.ncols(), triplets).filter(|_, _, v| v.abs() > DROP_TOL)
}

/// Number of entries whose magnitude exceeds `DROP_TOL`.
pub fn nnz_significant(m: &CscMatrix<f64>) -> usize {
    m.values().iter().filter(|v| v.abs() > DROP_TOL).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csc_from_triplets_sums_duplicates() {
        let m = csc_from_triplets(2, 2, vec![(0, 0, 1.0), (0, 0, 2.0), (1, 1, 4.0)]);
        let d = csc_to_dense(&m);
        assert_eq!(d[(0, 0)], 3.0);
        assert_eq!(d[(1, 1)], 4.0);
    }

    #[test]
    fn test_try_from_triplets_reports_out_of_range() {
        let ok = try_csc_from_triplets(2, 3, vec![(1, 2, 1.0)]).unwrap();
        assert_eq!(ok.nnz(), 1);
        assert!(matches!(
            try_csc_from_triplets(2, 3, vec![(0, 3, 1.0)]),
            Err(CanonError::ShapeError { .. })
        ));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside 2x2")]
    fn test_from_triplets_out_of_range_asserts() {
        csc_from_triplets(2, 2, vec![(2, 0, 1.0)]);
    }

    #[test]
    fn test_dense_sparse_matmul() {
        let dense = DMatrix::from_row_slice(1, 3, &[1.0, 1.0, 1.0]);
        let sparse = CscMatrix::identity(3);
        let prod = csc_to_dense(&dense_sparse_matmul(&dense, &sparse));
        assert_eq!(prod, DMatrix::from_row_slice(1, 3, &[1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_dense_sparse_matmul_drops_cancellations() {
        let dense = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
        let sparse = csc_from_triplets(2, 2, vec![(0, 0, 2.0), (1, 0, 2.0), (1, 1, 3.0)]);
        let prod = dense_sparse_matmul(&dense, &sparse);
        assert_eq!(prod.nnz(), 1);
        assert_eq!(csc_to_dense(&prod)[(0, 1)], -3.0);
    }

    #[test]
    fn test_repeat_rows() {
        let row = csc_from_triplets(1, 2, vec![(0, 1, 3.0)]);
        let r = csc_to_dense(&csc_repeat_rows(&row, 3));
        assert_eq!(r.nrows(), 3);
        assert!(r.column(1).iter().all(|&v| v == 3.0));
    }
}
