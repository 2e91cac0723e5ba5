//! Shape representation for variables and expressions.
//!
//! Every shape is two-dimensional:
//! - `()` is a 1 x 1 scalar
//! - `n` or `(n,)` is an n x 1 column vector
//! - `(m, n)` is an m x n matrix
//!
//! Matrices are vectorized column-major wherever a flat index is needed.

use std::fmt;

/// Shape of a variable or expression.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    rows: usize,
    cols: usize,
}

impl Shape {
    /// Create a scalar shape.
    pub fn scalar() -> Self {
        Shape { rows: 1, cols: 1 }
    }

    /// Create a column vector shape.
    pub fn vector(n: usize) -> Self {
        Shape { rows: n, cols: 1 }
    }

    /// Create a matrix shape.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Shape { rows, cols }
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_scalar(&self) -> bool {
        self.rows == 1 && self.cols == 1
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Get the transposed shape.
    pub fn transpose(&self) -> Self {
        Shape::matrix(self.cols, self.rows)
    }

    /// Column-major flat index of element `(i, j)`.
    pub fn flat_index(&self, i: usize, j: usize) -> usize {
        j * self.rows + i
    }
}

impl Default for Shape {
    fn default() -> Self {
        Shape::scalar()
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({}x{})", self.rows, self.cols)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.rows, self.cols)
    }
}

// Conversion traits
impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Shape::scalar()
    }
}

impl From<usize> for Shape {
    fn from(n: usize) -> Self {
        Shape::vector(n)
    }
}

impl From<(usize,)> for Shape {
    fn from((n,): (usize,)) -> Self {
        Shape::vector(n)
    }
}

impl From<(usize, usize)> for Shape {
    fn from((m, n): (usize, usize)) -> Self {
        Shape::matrix(m, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar() {
        let s = Shape::scalar();
        assert!(s.is_scalar());
        assert_eq!(s.size(), 1);
        assert_eq!(s.rows(), 1);
        assert_eq!(s.cols(), 1);
    }

    #[test]
    fn test_vector() {
        let s = Shape::vector(5);
        assert!(!s.is_scalar());
        assert_eq!(s.size(), 5);
        assert_eq!(s.rows(), 5);
        assert_eq!(s.cols(), 1);
    }

    #[test]
    fn test_matrix() {
        let s = Shape::matrix(3, 4);
        assert_eq!(s.size(), 12);
        assert!(!s.is_square());
        assert_eq!(s.transpose(), Shape::matrix(4, 3));
    }

    #[test]
    fn test_flat_index_is_column_major() {
        let s = Shape::matrix(3, 2);
        assert_eq!(s.flat_index(0, 0), 0);
        assert_eq!(s.flat_index(2, 0), 2);
        assert_eq!(s.flat_index(0, 1), 3);
    }

    #[test]
    fn test_conversions() {
        let _: Shape = ().into();
        assert_eq!(Shape::from(5), Shape::vector(5));
        assert_eq!(Shape::from((5,)), Shape::vector(5));
        assert_eq!(Shape::from((3, 4)), Shape::matrix(3, 4));
    }
}
