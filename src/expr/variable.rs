//! Variable declarations with builder pattern.

use std::collections::BTreeSet;

use super::shape::Shape;
use crate::solver::Backend;

/// Kind of a declared variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VarKind {
    #[default]
    Continuous,
    Integer,
    Binary,
    /// Either zero or within its bounds.
    SemiContinuous,
    /// Either zero or an integer within its bounds.
    SemiInteger,
    /// Symmetric matrix, stored as its packed lower triangle.
    Symmetric,
}

impl VarKind {
    /// Number of flat slots a variable of this kind and shape occupies.
    pub fn width(&self, shape: Shape) -> usize {
        match self {
            VarKind::Symmetric => {
                let n = shape.rows();
                n * (n + 1) / 2
            }
            _ => shape.size(),
        }
    }

    /// Whether the kind restricts values to integers.
    pub fn is_integral(&self) -> bool {
        matches!(self, VarKind::Integer | VarKind::Binary | VarKind::SemiInteger)
    }

    /// Whether the kind is acceptable in a purely continuous conic problem.
    pub fn is_continuous(&self) -> bool {
        matches!(self, VarKind::Continuous | VarKind::Symmetric)
    }
}

/// Packed position of element `(i, j)` of a symmetric `n x n` matrix.
///
/// The lower triangle is stored column by column, so `(i, j)` and `(j, i)`
/// share a slot.
pub fn packed_index(n: usize, i: usize, j: usize) -> usize {
    let (i, j) = if i >= j { (i, j) } else { (j, i) };
    j * n - j * j.saturating_sub(1) / 2 + (i - j)
}

/// A bound as given at declaration time.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundSpec {
    /// Same bound for every element.
    Scalar(f64),
    /// One bound per flat slot.
    Elementwise(Vec<f64>),
}

impl BoundSpec {
    /// Expand to one value per slot, or `None` if the length does not match.
    pub(crate) fn expand(&self, width: usize) -> Option<Vec<f64>> {
        match self {
            BoundSpec::Scalar(v) => Some(vec![*v; width]),
            BoundSpec::Elementwise(vals) if vals.len() == width => Some(vals.clone()),
            BoundSpec::Elementwise(_) => None,
        }
    }
}

/// A declared variable with its range in the flat coordinate space.
#[derive(Debug, Clone)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) shape: Shape,
    pub(crate) kind: VarKind,
    pub(crate) lower: Option<Vec<f64>>,
    pub(crate) upper: Option<Vec<f64>>,
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) tags: BTreeSet<Backend>,
}

impl Variable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn kind(&self) -> VarKind {
        self.kind
    }

    /// First flat slot.
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last flat slot.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of flat slots.
    pub fn width(&self) -> usize {
        self.end - self.start
    }

    /// Per-slot lower bounds, if any were declared (binary variables imply 0).
    pub fn lower(&self) -> Option<&[f64]> {
        self.lower.as_deref()
    }

    /// Per-slot upper bounds, if any were declared (binary variables imply 1).
    pub fn upper(&self) -> Option<&[f64]> {
        self.upper.as_deref()
    }

    /// Whether this variable has been materialized for `backend`.
    pub fn is_tagged(&self, backend: Backend) -> bool {
        self.tags.contains(&backend)
    }

    /// A declaration reproducing this variable's name, shape, kind and bounds.
    pub fn to_builder(&self) -> VariableBuilder {
        VariableBuilder {
            name: self.name.clone(),
            shape: self.shape,
            kind: self.kind,
            lower: self.lower.clone().map(BoundSpec::Elementwise),
            upper: self.upper.clone().map(BoundSpec::Elementwise),
        }
    }

    /// Slot within this variable holding element `(i, j)` of its shape.
    pub fn slot(&self, i: usize, j: usize) -> usize {
        match self.kind {
            VarKind::Symmetric => packed_index(self.shape.rows(), i, j),
            _ => self.shape.flat_index(i, j),
        }
    }
}

/// Builder for variable declarations.
#[derive(Debug, Clone)]
pub struct VariableBuilder {
    pub(crate) name: String,
    pub(crate) shape: Shape,
    pub(crate) kind: VarKind,
    pub(crate) lower: Option<BoundSpec>,
    pub(crate) upper: Option<BoundSpec>,
}

impl VariableBuilder {
    /// Create a new continuous variable declaration with the given shape.
    pub fn new(name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        Self {
            name: name.into(),
            shape: shape.into(),
            kind: VarKind::Continuous,
            lower: None,
            upper: None,
        }
    }

    /// Create a scalar variable declaration.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, Shape::scalar())
    }

    /// Create a vector variable declaration.
    pub fn vector(name: impl Into<String>, n: usize) -> Self {
        Self::new(name, Shape::vector(n))
    }

    /// Create a symmetric `n x n` matrix variable declaration.
    pub fn symmetric(name: impl Into<String>, n: usize) -> Self {
        Self::new(name, Shape::matrix(n, n)).kind(VarKind::Symmetric)
    }

    /// Set the variable kind.
    pub fn kind(mut self, kind: VarKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn integer(self) -> Self {
        self.kind(VarKind::Integer)
    }

    pub fn binary(self) -> Self {
        self.kind(VarKind::Binary)
    }

    /// Same lower bound on every slot.
    pub fn lower(mut self, bound: f64) -> Self {
        self.lower = Some(BoundSpec::Scalar(bound));
        self
    }

    /// Same upper bound on every slot.
    pub fn upper(mut self, bound: f64) -> Self {
        self.upper = Some(BoundSpec::Scalar(bound));
        self
    }

    /// One lower bound per slot.
    pub fn lower_elementwise(mut self, bounds: Vec<f64>) -> Self {
        self.lower = Some(BoundSpec::Elementwise(bounds));
        self
    }

    /// One upper bound per slot.
    pub fn upper_elementwise(mut self, bounds: Vec<f64>) -> Self {
        self.upper = Some(BoundSpec::Elementwise(bounds));
        self
    }

    /// Constrain the variable to be non-negative.
    pub fn nonneg(self) -> Self {
        self.lower(0.0)
    }
}
