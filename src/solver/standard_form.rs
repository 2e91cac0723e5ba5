//! Standard conic form assembled from the constraint store.
//!
//! Blocks are kept as triplet lists over the flat coordinate space. Additions
//! only append columns and rows, so blocks encoded by an earlier build stay
//! valid and later builds append to them. Matrices are materialized on
//! request with the current column count.

use nalgebra_sparse::CscMatrix;

use crate::canon::{canonicalize, canonicalize_quadratic, Gh};
use crate::config::EncodingPolicy;
use crate::constraints::{Constraint, ConstraintStore, LinearSense, SdpSense, StoredConstraint};
use crate::error::{CanonError, Result};
use crate::expr::AffineExpr;
use crate::model::VariableTable;
use crate::problem::{Objective, ObjectiveSense};
use crate::sparse::{csc_from_triplets, csc_triplets, DROP_TOL};

/// A sparse block with its constant column.
///
/// Cone blocks read as "`h - G x` lies in the cone"; log-sum-exp blocks as
/// the value `G x + h`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub triplets: Vec<(usize, usize, f64)>,
    pub h: Vec<f64>,
}

impl Block {
    fn cone(member: &Gh) -> Self {
        Block {
            triplets: member.g.triplet_iter().map(|(r, c, v)| (r, c, -*v)).collect(),
            h: member.h.iter().copied().collect(),
        }
    }

    fn value(map: &Gh) -> Self {
        Block {
            triplets: map.triplets(),
            h: map.h.iter().copied().collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.h.len()
    }

    /// `G` over `ncols` coordinates.
    pub fn matrix(&self, ncols: usize) -> CscMatrix<f64> {
        csc_from_triplets(self.rows(), ncols, self.triplets.iter().copied())
    }
}

/// Stacked linear rows `A x (= | <=) b`, each remembering its constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBlock {
    pub triplets: Vec<(usize, usize, f64)>,
    pub rhs: Vec<f64>,
    /// Flat index of the constraint each row came from.
    pub origin: Vec<usize>,
}

impl RowBlock {
    pub fn rows(&self) -> usize {
        self.rhs.len()
    }

    pub fn matrix(&self, ncols: usize) -> CscMatrix<f64> {
        csc_from_triplets(self.rows(), ncols, self.triplets.iter().copied())
    }

    fn push_row(&mut self, entries: &[(usize, f64)], rhs: f64, origin: usize) {
        let r = self.rows();
        self.triplets.extend(entries.iter().map(|&(c, v)| (r, c, v)));
        self.rhs.push(rhs);
        self.origin.push(origin);
    }
}

/// Second-order cone flavour before conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConeKind {
    /// `||E1|| <= E2`, member `[E2; E1]`.
    SecondOrder,
    /// `||E1||^2 <= E2 E3`, member `[(E2+E3)/2; (E2-E3)/2; E1]`.
    Rotated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConeBlock {
    pub kind: ConeKind,
    pub block: Block,
    pub constraint: usize,
}

impl ConeBlock {
    pub fn dim(&self) -> usize {
        self.block.rows()
    }
}

/// `h - G x = vec(S)` with `S` of side `side` positive semidefinite.
#[derive(Debug, Clone, PartialEq)]
pub struct SdpBlock {
    pub side: usize,
    pub block: Block,
    pub constraint: usize,
}

/// Bilinear part of a quadratic constraint whose affine part is row `row`
/// of the inequality block: `x' P x + (A x)_row <= b_row`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadBlock {
    pub constraint: usize,
    pub row: usize,
    /// Symmetric `P` as triplets.
    pub p: Vec<(usize, usize, f64)>,
}

/// `log(sum(exp(arg))) <= bound`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSumExpBlock {
    pub constraint: usize,
    pub arg: Block,
    pub bound: Block,
}

/// `sense  c' x + x' P x + offset`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectiveBlock {
    pub sense: ObjectiveSense,
    pub c: Vec<f64>,
    pub offset: f64,
    /// Symmetric `P` as triplets; empty for a linear objective.
    pub p: Vec<(usize, usize, f64)>,
}

/// One bound implied by a single-variable linear row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Tightening {
    Lower(usize, f64),
    Upper(usize, f64),
}

/// The standard conic form of a problem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardForm {
    pub num_vars: usize,
    pub objective: ObjectiveBlock,
    pub eq: RowBlock,
    pub ineq: RowBlock,
    pub cones: Vec<ConeBlock>,
    pub sdp: Vec<SdpBlock>,
    pub quadratic: Vec<QuadBlock>,
    pub log_sum_exp: Vec<LogSumExpBlock>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub integer_columns: Vec<usize>,
    pub binary_columns: Vec<usize>,
    pub semicontinuous_columns: Vec<usize>,
    pub(crate) tightenings: Vec<Tightening>,
}

impl StandardForm {
    /// Encode every constraint from scratch.
    pub fn build(
        table: &VariableTable,
        store: &ConstraintStore,
        objective: &Objective,
        sense: ObjectiveSense,
        policy: EncodingPolicy,
    ) -> Result<Self> {
        let mut form = StandardForm::default();
        form.extend(table, store, objective, sense, policy, |_| true)?;
        Ok(form)
    }

    /// Encode the constraints accepted by `include`, in sequence order, and
    /// refresh the objective and the per-variable data.
    ///
    /// Returns the flat indices of the constraints encoded.
    pub(crate) fn extend(
        &mut self,
        table: &VariableTable,
        store: &ConstraintStore,
        objective: &Objective,
        sense: ObjectiveSense,
        policy: EncodingPolicy,
        include: impl Fn(&StoredConstraint) -> bool,
    ) -> Result<Vec<usize>> {
        let mut encoded = Vec::new();
        for (index, entry) in store.iter().enumerate() {
            if include(entry) {
                self.encode(index, &entry.constraint, table, policy)?;
                encoded.push(index);
            }
        }
        self.encode_objective(objective, sense, table)?;
        self.refresh_variables(table);

        tracing::trace!(
            component = "standard_form",
            operation = "extend",
            encoded = encoded.len(),
            eq_rows = self.eq.rows(),
            ineq_rows = self.ineq.rows(),
            cones = self.cones.len(),
            sdp = self.sdp.len(),
            "Encoded constraints"
        );
        Ok(encoded)
    }

    fn encode(
        &mut self,
        index: usize,
        constraint: &Constraint,
        table: &VariableTable,
        policy: EncodingPolicy,
    ) -> Result<()> {
        match constraint {
            Constraint::Linear { lhs, rhs, sense } => {
                let g1 = canonicalize(lhs, table)?;
                let g2 = canonicalize(rhs, table)?;
                // row(x) (= | <=) 0
                let row = match sense {
                    LinearSense::Ge => g2.sub(&g1)?,
                    LinearSense::Eq | LinearSense::Le => g1.sub(&g2)?,
                };
                self.push_linear(&row, *sense == LinearSense::Eq, index, policy);
            }
            Constraint::SecondOrderCone { arg, bound } => {
                let e1 = canonicalize(arg, table)?;
                let e2 = canonicalize(bound, table)?;
                self.cones.push(ConeBlock {
                    kind: ConeKind::SecondOrder,
                    block: Block::cone(&Gh::vstack(&[&e2, &e1])),
                    constraint: index,
                });
            }
            Constraint::RotatedCone {
                arg,
                bound1,
                bound2,
            } => {
                let n = table.total_width();
                let side = |b: &Option<AffineExpr>| match b {
                    Some(e) => canonicalize(e, table),
                    None => Ok(Gh::constant(vec![1.0], n)),
                };
                let e1 = canonicalize(arg, table)?;
                let e2 = side(bound1)?;
                let e3 = side(bound2)?;
                let t = e2.axpy(1.0, &e3)?.scale(0.5);
                let s = e2.axpy(-1.0, &e3)?.scale(0.5);
                self.cones.push(ConeBlock {
                    kind: ConeKind::Rotated,
                    block: Block::cone(&Gh::vstack(&[&t, &s, &e1])),
                    constraint: index,
                });
            }
            Constraint::Semidefinite { lhs, rhs, sense } => {
                let e1 = canonicalize(lhs, table)?;
                let e2 = canonicalize(rhs, table)?;
                let member = match sense {
                    SdpSense::Preceq => e2.sub(&e1)?,
                    SdpSense::Succeq => e1.sub(&e2)?,
                };
                self.sdp.push(SdpBlock {
                    side: lhs.shape.rows(),
                    block: Block::cone(&member),
                    constraint: index,
                });
            }
            Constraint::Quadratic { expr } => {
                let (p, affine) = canonicalize_quadratic(expr, table)?;
                let (entries, constant) = scalar_row(&affine)?;
                let row = self.ineq.rows();
                self.ineq.push_row(&entries, -constant, index);
                self.quadratic.push(QuadBlock {
                    constraint: index,
                    row,
                    p: csc_triplets(&p),
                });
            }
            Constraint::LogSumExp { arg, bound } => {
                self.log_sum_exp.push(LogSumExpBlock {
                    constraint: index,
                    arg: Block::value(&canonicalize(arg, table)?),
                    bound: Block::value(&canonicalize(bound, table)?),
                });
            }
        }
        Ok(())
    }

    /// Append the rows of `row(x) (= | <=) 0`.
    fn push_linear(&mut self, row: &Gh, equality: bool, index: usize, policy: EncodingPolicy) {
        for (r, entries) in row_entries(row).into_iter().enumerate() {
            let rhs = -row.h[r];
            if policy.bound_tightening && entries.len() == 1 {
                let (col, a) = entries[0];
                let value = rhs / a;
                if equality {
                    self.tightenings.push(Tightening::Lower(col, value));
                    self.tightenings.push(Tightening::Upper(col, value));
                } else if a > 0.0 {
                    self.tightenings.push(Tightening::Upper(col, value));
                } else {
                    self.tightenings.push(Tightening::Lower(col, value));
                }
                continue;
            }
            let target = if equality { &mut self.eq } else { &mut self.ineq };
            target.push_row(&entries, rhs, index);
        }
    }

    fn encode_objective(
        &mut self,
        objective: &Objective,
        sense: ObjectiveSense,
        table: &VariableTable,
    ) -> Result<()> {
        let n = table.total_width();
        let mut block = ObjectiveBlock {
            sense,
            c: vec![0.0; n],
            offset: 0.0,
            p: Vec::new(),
        };
        if sense != ObjectiveSense::Find {
            let affine = match objective {
                Objective::Affine(e) => {
                    if !e.shape.is_scalar() {
                        return Err(CanonError::shape("scalar objective", e.shape.to_string()));
                    }
                    canonicalize(e, table)?
                }
                Objective::Quadratic(q) => {
                    let (p, affine) = canonicalize_quadratic(q, table)?;
                    block.p = csc_triplets(&p);
                    affine
                }
            };
            let (entries, constant) = scalar_row(&affine)?;
            for (col, v) in entries {
                block.c[col] += v;
            }
            block.offset = constant;
        }
        self.objective = block;
        Ok(())
    }

    fn refresh_variables(&mut self, table: &VariableTable) {
        self.num_vars = table.total_width();
        self.lower = table.lower_bounds();
        self.upper = table.upper_bounds();
        for t in &self.tightenings {
            match *t {
                Tightening::Lower(col, v) => self.lower[col] = self.lower[col].max(v),
                Tightening::Upper(col, v) => self.upper[col] = self.upper[col].min(v),
            }
        }
        self.integer_columns = table.integer_columns();
        self.binary_columns = table.binary_columns();
        self.semicontinuous_columns = table.semicontinuous_columns();
    }

    /// Equality matrix `A`.
    pub fn a(&self) -> CscMatrix<f64> {
        self.eq.matrix(self.num_vars)
    }

    /// Inequality matrix `G` of `G x <= h`.
    pub fn g(&self) -> CscMatrix<f64> {
        self.ineq.matrix(self.num_vars)
    }

    /// Objective value at `x`, in the problem's own sense.
    pub fn objective_value(&self, x: &[f64]) -> f64 {
        let linear: f64 = self.objective.c.iter().zip(x).map(|(c, x)| c * x).sum();
        let quad: f64 = self
            .objective
            .p
            .iter()
            .map(|&(r, c, v)| x[r] * v * x[c])
            .sum();
        linear + quad + self.objective.offset
    }

    /// Whether any column is restricted to integers.
    pub fn has_integers(&self) -> bool {
        !self.integer_columns.is_empty()
    }

    /// Number of bounds set to a finite value.
    pub fn finite_bounds(&self) -> usize {
        self.lower
            .iter()
            .chain(self.upper.iter())
            .filter(|v| v.is_finite())
            .count()
    }
}

/// The single row of a scalar map.
fn scalar_row(map: &Gh) -> Result<(Vec<(usize, f64)>, f64)> {
    if map.rows() != 1 {
        return Err(CanonError::shape("scalar expression", format!("{} rows", map.rows())));
    }
    let entries = row_entries(map).into_iter().next().unwrap_or_default();
    Ok((entries, map.h[0]))
}

/// Significant entries of every row of `G`, sorted by column.
fn row_entries(map: &Gh) -> Vec<Vec<(usize, f64)>> {
    let mut rows = vec![Vec::new(); map.rows()];
    for (r, c, v) in map.g.triplet_iter() {
        if v.abs() > DROP_TOL {
            rows[r].push((c, *v));
        }
    }
    rows
}
