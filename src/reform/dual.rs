//! Conic duality.
//!
//! For the primal
//!
//! ```text
//! minimize    c'x + c0
//! subject to  A x = b,  G x <= h,  h_k - G_k x in SOC,  h_s - G_s x = vec(S_s), S_s >= 0
//! ```
//!
//! the dual is
//!
//! ```text
//! maximize    c0 - b'mu - h'lambda - sum h_k'z_k - sum h_s'vec(Z_s)
//! subject to  A'mu + G'lambda + sum G_k'z_k + sum G_s'vec(Z_s) = -c
//!             lambda >= 0,  z_k in SOC,  Z_s >= 0
//! ```
//!
//! Variable bounds are folded into `G x <= h` first. A maximize primal is
//! negated going in and its dual negated coming out, so both problems share
//! their optimal value.

use nalgebra::DMatrix;
use nalgebra_sparse::CscMatrix;

use crate::constraints::Constraint;
use crate::error::{CanonError, Result};
use crate::expr::{AffineExpr, Shape, VariableBuilder};
use crate::problem::{ObjectiveSense, Problem};
use crate::sparse::csc_from_triplets;

fn check_dualizable(problem: &Problem) -> Result<()> {
    if let Some(var) = problem.variables().iter().find(|v| !v.kind().is_continuous()) {
        return Err(CanonError::Dualization(format!(
            "variable {} is {:?}",
            var.name(),
            var.kind()
        )));
    }
    if problem.objective().is_quadratic() {
        return Err(CanonError::Dualization("quadratic objective".into()));
    }
    let totals = problem.totals();
    if totals.quadratic > 0 {
        return Err(CanonError::Dualization("quadratic constraints".into()));
    }
    if totals.log_sum_exp > 0 {
        return Err(CanonError::Dualization("log-sum-exp constraints".into()));
    }
    Ok(())
}

/// `M' v` for the expression `v` of a dual variable.
///
/// The variable's block maps its slots to `vec(v)`, so the product stays a
/// sparse-sparse one: `(n x rows(M)) * (rows(M) x width)`.
fn adjoint(m: &CscMatrix<f64>, v: &AffineExpr) -> Result<AffineExpr> {
    if v.size() != m.nrows() {
        return Err(CanonError::shape(
            format!("{} dual entries", m.nrows()),
            v.size().to_string(),
        ));
    }
    let mt = m.transpose();
    let mut out = AffineExpr::zeros(Shape::vector(m.ncols()));
    for (name, block) in &v.coeffs {
        out = out.with_term(name.clone(), &mt * block)?;
    }
    Ok(out)
}

/// `z[1..]` for the vector variable `name` of length `dim`.
fn tail(name: &str, dim: usize) -> Result<AffineExpr> {
    let selector = csc_from_triplets(dim - 1, dim, (0..dim - 1).map(|i| (i, i + 1, 1.0)));
    AffineExpr::zeros(Shape::vector(dim - 1)).with_term(name, selector)
}

/// Build the conic dual of `problem`.
pub fn dualize(problem: &Problem) -> Result<Problem> {
    check_dualizable(problem)?;
    let form = problem.scratch_form()?;
    let n = form.num_vars;

    // Work with a minimization primal.
    let sign = if problem.sense() == ObjectiveSense::Maximize {
        -1.0
    } else {
        1.0
    };
    let neg_c: Vec<f64> = form.objective.c.iter().map(|c| -sign * c).collect();
    let c0 = sign * form.objective.offset;

    // G x <= h with the bounds appended.
    let mut g_triplets = form.ineq.triplets.clone();
    let mut h = form.ineq.rhs.clone();
    for (j, &u) in form.upper.iter().enumerate() {
        if u.is_finite() {
            g_triplets.push((h.len(), j, 1.0));
            h.push(u);
        }
    }
    for (j, &l) in form.lower.iter().enumerate() {
        if l.is_finite() {
            g_triplets.push((h.len(), j, -1.0));
            h.push(-l);
        }
    }
    let g = csc_from_triplets(h.len(), n, g_triplets);

    let mut out = Problem::with_options(problem.options().clone());
    let mut stationarity = AffineExpr::zeros(Shape::vector(n));
    let mut objective = AffineExpr::scalar(c0);

    if form.eq.rows() > 0 {
        let mu = out.add_variable(VariableBuilder::vector("mu", form.eq.rows()))?;
        let a = form.a();
        stationarity = stationarity.add(&adjoint(&a, &mu)?)?;
        objective = objective.sub(&mu.dot(&form.eq.rhs)?)?;
    }

    if !h.is_empty() {
        let lambda = out.add_variable(VariableBuilder::vector("lambda", h.len()).nonneg())?;
        stationarity = stationarity.add(&adjoint(&g, &lambda)?)?;
        objective = objective.sub(&lambda.dot(&h)?)?;
    }

    for (k, cone) in form.cones.iter().enumerate() {
        let dim = cone.dim();
        let name = format!("z_{}", k);
        let z = out.add_variable(VariableBuilder::vector(name.as_str(), dim))?;
        let gk = cone.block.matrix(n);
        stationarity = stationarity.add(&adjoint(&gk, &z)?)?;
        objective = objective.sub(&z.dot(&cone.block.h)?)?;

        let head = z.entry(0, 0)?;
        out.add_constraint(Constraint::soc(tail(&name, dim)?, head)?)?;
    }

    for (k, sdp) in form.sdp.iter().enumerate() {
        let side = sdp.side;
        let big_z = out.add_variable(VariableBuilder::symmetric(format!("Z_{}", k), side))?;
        let gs = sdp.block.matrix(n);
        stationarity = stationarity.add(&adjoint(&gs, &big_z)?)?;
        let hs = DMatrix::from_column_slice(side, side, &sdp.block.h);
        objective = objective.sub(&big_z.inner(&hs)?)?;
        out.add_constraint(Constraint::psd(big_z)?)?;
    }

    if n > 0 {
        out.add_keyed_constraint(
            "stationarity",
            Constraint::eq(stationarity, AffineExpr::constant_vec(neg_c))?,
        )?;
    }

    if sign > 0.0 {
        out.maximize(objective)?;
    } else {
        out.minimize(objective.neg())?;
    }

    tracing::debug!(
        component = "reform",
        operation = "dualize",
        primal_vars = n,
        dual_vars = out.variables().total_width(),
        cones = form.cones.len(),
        sdp = form.sdp.len(),
        "Built conic dual"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintExt;
    use crate::expr::QuadExpr;

    fn small_lp() -> Problem {
        // minimize x0 + 2 x1  s.t.  x0 + x1 = 1,  x >= 0
        let mut problem = Problem::new();
        let x = problem
            .add_variable(VariableBuilder::vector("x", 2).nonneg())
            .unwrap();
        problem
            .add_constraint(x.sum().equals(&AffineExpr::scalar(1.0)).unwrap())
            .unwrap();
        problem.minimize(x.dot(&[1.0, 2.0]).unwrap()).unwrap();
        problem
    }

    #[test]
    fn test_dual_structure() {
        let dual = dualize(&small_lp()).unwrap();
        assert_eq!(dual.sense(), ObjectiveSense::Maximize);
        assert_eq!(dual.variable("mu").unwrap().width(), 1);
        assert_eq!(dual.variable("lambda").unwrap().width(), 2);
        assert_eq!(dual.variable("lambda").unwrap().lower(), Some(&[0.0, 0.0][..]));
        assert_eq!(dual.totals().linear, 1);
        assert_eq!(dual.totals().affine_rows, 2);
    }

    #[test]
    fn test_dual_objective_at_known_point() {
        // mu = -1, lambda = (0, 1) is dual optimal with value 1.
        let dual = dualize(&small_lp()).unwrap();
        let form = dual.scratch_form().unwrap();
        let mut point = vec![0.0; form.num_vars];
        point[dual.variable("mu").unwrap().start()] = -1.0;
        point[dual.variable("lambda").unwrap().start() + 1] = 1.0;
        assert!((form.objective_value(&point) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_integer_and_quadratic() {
        let mut problem = Problem::new();
        problem
            .add_variable(VariableBuilder::scalar("n").integer())
            .unwrap();
        assert!(matches!(dualize(&problem), Err(CanonError::Dualization(_))));

        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
        problem.minimize(QuadExpr::sum_squares(&x)).unwrap();
        assert!(matches!(dualize(&problem), Err(CanonError::Dualization(_))));
    }

    #[test]
    fn test_cone_blocks_get_soc_duals() {
        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
        let t = problem.add_variable(VariableBuilder::scalar("t")).unwrap();
        problem
            .add_constraint(Constraint::soc(x.clone(), t.clone()).unwrap())
            .unwrap();
        problem.minimize(t).unwrap();
        let dual = dualize(&problem).unwrap();
        assert_eq!(dual.variable("z_0").unwrap().width(), 3);
        assert_eq!(dual.totals().cone, 1);
        assert_eq!(dual.totals().cone_vars, 3);
    }

    #[test]
    fn test_stationarity_blocks_stay_sparse() {
        // x in R^40, x >= 0, sum(x) = 1, S >= 0 with S symmetric 3x3
        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::vector("x", 40)).unwrap();
        let s = problem
            .add_variable(VariableBuilder::symmetric("S", 3))
            .unwrap();
        problem
            .add_constraint(x.geq(&AffineExpr::scalar(0.0)).unwrap())
            .unwrap();
        problem
            .add_constraint(x.sum().equals(&AffineExpr::scalar(1.0)).unwrap())
            .unwrap();
        problem.add_constraint(Constraint::psd(s.clone()).unwrap()).unwrap();
        problem.minimize(x.entry(0, 0).unwrap()).unwrap();

        let dual = dualize(&problem).unwrap();
        let key = dual.find_constraint("stationarity").unwrap();
        let lhs = match &dual.constraint(key).unwrap()[0].constraint {
            Constraint::Linear { lhs, .. } => lhs.clone(),
            other => panic!("unexpected {:?}", other.kind()),
        };
        // one entry per row of -I, of the all-ones row, and of each packed slot
        assert_eq!(lhs.coeffs["lambda"].nnz(), 40);
        assert_eq!(lhs.coeffs["mu"].nnz(), 40);
        let z = &lhs.coeffs["Z_0"];
        assert_eq!((z.nrows(), z.ncols()), (46, 6));
        assert_eq!(z.nnz(), 6);
        // the slot of S(1, 0) meets both mirrored entries of Z; G negates the member
        let dense = crate::sparse::csc_to_dense(z);
        assert_eq!(dense[(41, 1)], -2.0);
    }
}
