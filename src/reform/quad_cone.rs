//! Rewriting quadratic constraints and objectives as rotated cones.
//!
//! A convex `x'Qx + a'x + b <= 0` is factored as `Q = A'A` and replaced by
//! `||A x||^2 <= t` together with `t + a'x + b <= 0` for a fresh scalar `t`.
//! Auxiliary variables are declared after all original ones, so the original
//! flat columns keep their positions.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, SymmetricEigen};

use crate::constraints::{Batch, Constraint};
use crate::error::{CanonError, Result};
use crate::expr::{AffineExpr, QuadExpr, Shape, VariableBuilder};
use crate::model::VariableTable;
use crate::problem::{Objective, ObjectiveSense, Problem};
use crate::sparse::dense_to_csc;

/// Prefix of auxiliary variable names.
const AUX_PREFIX: &str = "__quad";

/// The factor of a quadratic form as an affine map: `x'Qx = ||F x||^2`.
///
/// `None` when `Q` has no positive part.
fn factor(q: &QuadExpr, table: &VariableTable, tolerance: f64) -> Result<Option<AffineExpr>> {
    // Local coordinates: the involved variables, concatenated in name order.
    let mut offsets: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    let mut m = 0;
    for (u, v) in q.quad.keys() {
        for name in [u.as_str(), v.as_str()] {
            if !offsets.contains_key(name) {
                let width = table.require(name)?.width();
                offsets.insert(name, (0, width));
            }
        }
    }
    for (_, (offset, width)) in offsets.iter_mut() {
        *offset = m;
        m += *width;
    }
    if m == 0 {
        return Ok(None);
    }

    let mut local: DMatrix<f64> = DMatrix::zeros(m, m);
    for ((u, v), block) in &q.quad {
        let (ou, _) = offsets[u.as_str()];
        let (ov, _) = offsets[v.as_str()];
        for (r, c, val) in block.triplet_iter() {
            local[(ou + r, ov + c)] += 0.5 * *val;
            local[(ov + c, ou + r)] += 0.5 * *val;
        }
    }

    let eigen = SymmetricEigen::new(local);
    let mut kept: Vec<(usize, f64)> = Vec::new();
    for (k, &lambda) in eigen.eigenvalues.iter().enumerate() {
        if lambda < -tolerance {
            return Err(CanonError::NonConvex(format!(
                "quadratic form has eigenvalue {:.3e}",
                lambda
            )));
        }
        if lambda > tolerance {
            kept.push((k, lambda.sqrt()));
        }
    }
    if kept.is_empty() {
        return Ok(None);
    }

    // Row i of F is sqrt(lambda_k) v_k'.
    let k = kept.len();
    let f = DMatrix::from_fn(k, m, |i, j| {
        let (col, scale) = kept[i];
        scale * eigen.eigenvectors[(j, col)]
    });
    let mut expr = AffineExpr::zeros(Shape::vector(k));
    for (name, (offset, width)) in offsets {
        let block = f.columns(offset, width).into_owned();
        expr = expr.with_term(name, dense_to_csc(&block))?;
    }
    Ok(Some(expr))
}

/// Pick a name starting with `base` not yet declared.
fn fresh_name(table: &VariableTable, base: &str) -> String {
    if !table.contains(base) {
        return base.to_string();
    }
    (1..)
        .map(|i| format!("{}_{}", base, i))
        .find(|name| !table.contains(name))
        .unwrap_or_else(|| base.to_string())
}

/// Constraints replacing `x'Qx + a'x + b <= 0`.
fn rewrite_constraint(
    q: &QuadExpr,
    out: &mut Problem,
    index: usize,
    tolerance: f64,
) -> Result<Vec<Batch>> {
    match factor(q, out.variables(), tolerance)? {
        None => Ok(vec![Constraint::leq(q.affine.clone(), AffineExpr::scalar(0.0))?.into()]),
        Some(f) => {
            let name = fresh_name(out.variables(), &format!("{}_t{}", AUX_PREFIX, index));
            let t = out.add_variable(VariableBuilder::scalar(name))?;
            let cone = Constraint::rotated(f, Some(t.clone()), None)?;
            let row = Constraint::leq(t.add(&q.affine)?, AffineExpr::scalar(0.0))?;
            Ok(vec![cone.into(), row.into()])
        }
    }
}

/// Rewrite every quadratic constraint and a quadratic objective as cones.
///
/// The result has the same optimal value; its optimum restricted to the
/// original variables is an optimum of `problem`.
pub fn quad_to_cone(problem: &Problem) -> Result<Problem> {
    let tolerance = problem.options().psd_tolerance;
    let mut out = Problem::with_options(problem.options().clone());
    for var in problem.variables().iter() {
        out.add_variable(var.to_builder())?;
    }

    let store = problem.constraints();
    let mut rewritten = 0;
    for group in store.groups() {
        let mut items: Vec<Batch> = Vec::with_capacity(group.len());
        for index in group.first..=group.last {
            let entry = store.constraint(index)?;
            match &entry.constraint {
                Constraint::Quadratic { expr } => {
                    let replacement = rewrite_constraint(expr, &mut out, index, tolerance)?;
                    items.push(Batch::Group {
                        items: replacement,
                        label: None,
                    });
                    rewritten += 1;
                }
                other => items.push(other.clone().into()),
            }
        }
        let label = group.label.as_deref();
        let single = items.len() == 1 && matches!(items[0], Batch::One(_));
        match (&group.key, single) {
            (Some(key), true) => {
                if let Some(Batch::One(c)) = items.pop() {
                    out.add_keyed_constraint(key.clone(), c)?;
                }
            }
            (None, true) => {
                if let Some(Batch::One(c)) = items.pop() {
                    out.add_constraint(c)?;
                }
            }
            (Some(key), false) => {
                out.add_keyed_group(key.clone(), items, label)?;
            }
            (None, false) => {
                out.add_group(items, label)?;
            }
        }
    }

    match (problem.sense(), problem.objective()) {
        (ObjectiveSense::Find, _) => out.find(),
        (sense, Objective::Affine(e)) => out.set_objective(sense, e.clone())?,
        (sense, Objective::Quadratic(q)) if q.is_affine() => {
            out.set_objective(sense, q.affine.clone())?
        }
        (sense, Objective::Quadratic(q)) => {
            // maximize f  <=>  maximize -(x'(-Q)x) + a'x + b
            let sign = if sense == ObjectiveSense::Maximize { -1.0 } else { 1.0 };
            let form = q.scale(sign);
            let factored = factor(&form, out.variables(), tolerance).map_err(|e| match e {
                CanonError::NonConvex(msg) => CanonError::NonConvex(format!(
                    "objective is not {} ({})",
                    if sign > 0.0 { "convex" } else { "concave" },
                    msg
                )),
                other => other,
            })?;
            match factored {
                None => out.set_objective(sense, q.affine.clone())?,
                Some(f) => {
                    let name = fresh_name(out.variables(), &format!("{}_epigraph", AUX_PREFIX));
                    let s = out.add_variable(VariableBuilder::scalar(name))?;
                    out.add_constraint(Constraint::rotated(f, Some(s.clone()), None)?)?;
                    out.set_objective(sense, s.scale(sign).add(&q.affine)?)?;
                }
            }
        }
    }

    tracing::debug!(
        component = "reform",
        operation = "quad_to_cone",
        rewritten,
        aux = out.variables().len() - problem.variables().len(),
        "Rewrote quadratic terms as cones"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintKind;

    #[test]
    fn test_factor_reproduces_form() {
        let mut table = VariableTable::new();
        table.declare(VariableBuilder::vector("x", 2)).unwrap();
        let q = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        let form = QuadExpr::quad_form(table.get("x").unwrap(), &q).unwrap();
        let f = factor(&form, &table, 1e-9).unwrap().unwrap();
        let point = [0.3, -1.2];
        let fx = f.evaluate(&table, &point).unwrap();
        let expected = form.evaluate(&table, &point).unwrap();
        assert!((fx.norm_squared() - expected).abs() < 1e-10);
    }

    #[test]
    fn test_indefinite_is_nonconvex() {
        let mut table = VariableTable::new();
        table.declare(VariableBuilder::vector("x", 2)).unwrap();
        let q = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]);
        let form = QuadExpr::quad_form(table.get("x").unwrap(), &q).unwrap();
        assert!(matches!(
            factor(&form, &table, 1e-9),
            Err(CanonError::NonConvex(_))
        ));
    }

    #[test]
    fn test_constraint_rewritten_with_one_aux() {
        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
        let t = problem.add_variable(VariableBuilder::scalar("t")).unwrap();
        let c = Constraint::quad_leq(
            QuadExpr::sum_squares(&x),
            QuadExpr::from_affine(t.clone()).unwrap(),
        )
        .unwrap();
        problem.add_constraint(c).unwrap();
        problem.minimize(t).unwrap();

        let out = quad_to_cone(&problem).unwrap();
        assert_eq!(out.variables().len(), 3);
        assert_eq!(out.totals().quadratic, 0);
        assert_eq!(out.totals().cone, 1);
        assert_eq!(out.totals().linear, 1);
        let kinds: Vec<_> = out.constraints().iter().map(|c| c.constraint.kind()).collect();
        assert_eq!(kinds, vec![ConstraintKind::Cone, ConstraintKind::Linear]);
        assert_eq!(out.constraints().groups().len(), 1);
    }

    #[test]
    fn test_maximize_needs_concave() {
        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
        problem.maximize(QuadExpr::sum_squares(&x)).unwrap();
        assert!(matches!(
            quad_to_cone(&problem),
            Err(CanonError::NonConvex(_))
        ));
    }
}
