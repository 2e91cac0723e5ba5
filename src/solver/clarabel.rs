//! Clarabel solver integration.
//!
//! Maps a [`StandardForm`] onto Clarabel's `min 1/2 x'Px + q'x` subject to
//! `Ax + s = b, s in K` with zero, nonnegative and second-order cones.

use clarabel::algebra::CscMatrix as ClarabelCsc;
use clarabel::solver::{DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT};

use super::standard_form::StandardForm;
use crate::config::Options;
use crate::error::{CanonError, Result};
use crate::expr::Variable;
use crate::problem::ObjectiveSense;
use crate::sparse::csc_from_triplets;

/// Solution status from the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Optimal solution found.
    Optimal,
    /// Problem is infeasible.
    Infeasible,
    /// Problem is unbounded.
    Unbounded,
    /// Iteration or time limit reached.
    MaxIterations,
    /// Unknown status.
    Unknown,
}

impl From<SolverStatus> for SolveStatus {
    fn from(status: SolverStatus) -> Self {
        match status {
            SolverStatus::Solved => SolveStatus::Optimal,
            SolverStatus::PrimalInfeasible => SolveStatus::Infeasible,
            SolverStatus::DualInfeasible => SolveStatus::Unbounded,
            SolverStatus::MaxIterations | SolverStatus::MaxTime => SolveStatus::MaxIterations,
            _ => SolveStatus::Unknown,
        }
    }
}

/// Solution from the solver.
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    /// Objective value in the problem's own sense (if solved).
    pub value: Option<f64>,
    /// Flat primal point (if solved).
    pub primal: Option<Vec<f64>>,
    /// Cone duals in row order: equalities, inequalities, bounds, cones.
    pub dual: Option<Vec<f64>>,
    /// Solve time in seconds.
    pub solve_time: f64,
    pub iterations: u32,
}

impl Solution {
    /// Values of a variable's flat slots.
    pub fn slots(&self, var: &Variable) -> Option<&[f64]> {
        self.primal.as_ref().map(|x| &x[var.start()..var.end()])
    }

    /// Value of a scalar variable.
    pub fn scalar(&self, var: &Variable) -> Option<f64> {
        match self.slots(var) {
            Some([v]) => Some(*v),
            _ => None,
        }
    }
}

/// Reject blocks Clarabel cannot express.
fn check_supported(form: &StandardForm) -> Result<()> {
    if !form.sdp.is_empty() {
        return Err(CanonError::Unsupported("semidefinite blocks for clarabel".into()));
    }
    if !form.quadratic.is_empty() {
        return Err(CanonError::Unsupported(
            "quadratic constraints for clarabel; reformulate them as cones".into(),
        ));
    }
    if !form.log_sum_exp.is_empty() {
        return Err(CanonError::Unsupported("log-sum-exp blocks for clarabel".into()));
    }
    if form.has_integers() || !form.semicontinuous_columns.is_empty() {
        return Err(CanonError::Unsupported("integer columns for clarabel".into()));
    }
    Ok(())
}

/// Constraint rows `A x + s = b` stacked in cone order.
struct Stacked {
    triplets: Vec<(usize, usize, f64)>,
    b: Vec<f64>,
    cones: Vec<SupportedConeT<f64>>,
}

impl Stacked {
    fn push_block(&mut self, triplets: &[(usize, usize, f64)], rhs: &[f64]) {
        let offset = self.b.len();
        self.triplets
            .extend(triplets.iter().map(|&(r, c, v)| (r + offset, c, v)));
        self.b.extend_from_slice(rhs);
    }
}

fn stack_rows(form: &StandardForm) -> Stacked {
    let mut s = Stacked {
        triplets: Vec::new(),
        b: Vec::new(),
        cones: Vec::new(),
    };

    if form.eq.rows() > 0 {
        s.push_block(&form.eq.triplets, &form.eq.rhs);
        s.cones.push(SupportedConeT::ZeroConeT(form.eq.rows()));
    }

    let before = s.b.len();
    s.push_block(&form.ineq.triplets, &form.ineq.rhs);
    // Bounds as rows: x_j <= u_j and -x_j <= -l_j.
    for (j, &u) in form.upper.iter().enumerate() {
        if u.is_finite() {
            s.push_block(&[(0, j, 1.0)], &[u]);
        }
    }
    for (j, &l) in form.lower.iter().enumerate() {
        if l.is_finite() {
            s.push_block(&[(0, j, -1.0)], &[-l]);
        }
    }
    let nonneg = s.b.len() - before;
    if nonneg > 0 {
        s.cones.push(SupportedConeT::NonnegativeConeT(nonneg));
    }

    for cone in &form.cones {
        s.push_block(&cone.block.triplets, &cone.block.h);
        s.cones.push(SupportedConeT::SecondOrderConeT(cone.dim()));
    }
    s
}

/// Solve a standard form with Clarabel.
pub fn solve(form: &StandardForm, options: &Options) -> Result<Solution> {
    check_supported(form)?;
    let n = form.num_vars;

    // Clarabel minimizes; a maximize objective is negated.
    let sign = if form.objective.sense == ObjectiveSense::Maximize {
        -1.0
    } else {
        1.0
    };
    // Clarabel uses (1/2) x' P x with P upper triangular, so scale by 2.
    let p_upper = form
        .objective
        .p
        .iter()
        .filter(|&&(r, c, _)| r <= c)
        .map(|&(r, c, v)| (r, c, 2.0 * sign * v));
    let p = csc_from_triplets(n, n, p_upper);
    let q: Vec<f64> = form.objective.c.iter().map(|c| sign * c).collect();

    let stacked = stack_rows(form);
    let a = csc_from_triplets(stacked.b.len(), n, stacked.triplets.iter().copied());

    let settings = DefaultSettingsBuilder::default()
        .verbose(options.verbose)
        .max_iter(options.max_iter)
        .time_limit(options.time_limit)
        .tol_gap_abs(options.tol_gap_abs)
        .tol_gap_rel(options.tol_gap_rel)
        .build()
        .map_err(|e| CanonError::Solver(format!("{:?}", e)))?;

    tracing::debug!(
        component = "clarabel",
        operation = "solve",
        vars = n,
        rows = stacked.b.len(),
        cones = stacked.cones.len(),
        "Calling Clarabel"
    );

    let mut solver = DefaultSolver::new(
        &to_clarabel_csc(&p),
        &q,
        &to_clarabel_csc(&a),
        &stacked.b,
        &stacked.cones,
        settings,
    );
    solver.solve();

    let status: SolveStatus = solver.solution.status.into();
    let solve_time = solver.solution.solve_time;
    let iterations = solver.info.iterations;

    if status == SolveStatus::Optimal {
        let x = solver.solution.x.clone();
        Ok(Solution {
            status,
            value: Some(form.objective_value(&x)),
            primal: Some(x),
            dual: Some(solver.solution.z.clone()),
            solve_time,
            iterations,
        })
    } else {
        Ok(Solution {
            status,
            value: None,
            primal: None,
            dual: None,
            solve_time,
            iterations,
        })
    }
}

/// Convert nalgebra CSC to Clarabel CSC.
fn to_clarabel_csc(m: &nalgebra_sparse::CscMatrix<f64>) -> ClarabelCsc<f64> {
    ClarabelCsc::new(
        m.nrows(),
        m.ncols(),
        m.col_offsets().to_vec(),
        m.row_indices().to_vec(),
        m.values().to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::standard_form::{Block, ConeBlock, ConeKind};

    #[test]
    fn test_bounds_become_nonneg_rows() {
        let form = StandardForm {
            num_vars: 2,
            lower: vec![0.0, f64::NEG_INFINITY],
            upper: vec![f64::INFINITY, 3.0],
            ..Default::default()
        };
        let s = stack_rows(&form);
        assert_eq!(s.b, vec![3.0, -0.0]);
        assert_eq!(s.triplets, vec![(0, 1, 1.0), (1, 0, -1.0)]);
        assert_eq!(s.cones.len(), 1);
    }

    #[test]
    fn test_cone_rows_follow_linear_rows() {
        let form = StandardForm {
            num_vars: 2,
            lower: vec![f64::NEG_INFINITY; 2],
            upper: vec![f64::INFINITY; 2],
            cones: vec![ConeBlock {
                kind: ConeKind::SecondOrder,
                block: Block {
                    triplets: vec![(1, 0, -1.0)],
                    h: vec![1.0, 0.0],
                },
                constraint: 0,
            }],
            ..Default::default()
        };
        let s = stack_rows(&form);
        assert_eq!(s.b, vec![1.0, 0.0]);
        assert_eq!(s.cones.len(), 1);
    }

    #[test]
    fn test_integer_columns_unsupported() {
        let form = StandardForm {
            num_vars: 1,
            integer_columns: vec![0],
            ..Default::default()
        };
        assert!(matches!(
            solve(&form, &Options::default()),
            Err(CanonError::Unsupported(_))
        ));
    }
}
