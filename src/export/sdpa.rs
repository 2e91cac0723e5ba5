//! SDPA sparse format writer.
//!
//! SDPA solves `minimize c'x` subject to `sum_i F_i x_i - F_0 >= 0` over a
//! block-diagonal matrix. Linear rows and bounds share one diagonal block,
//! each second-order cone becomes an arrow block and each semidefinite
//! constraint keeps its own block.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::error::{CanonError, Result};
use crate::problem::{ObjectiveSense, Problem};
use crate::solver::{Block, StandardForm};
use crate::sparse::DROP_TOL;

/// Entries keyed by `(matrix, block, row, col)`, all 1-based except the
/// matrix number where 0 is `F_0`.
#[derive(Debug, Default)]
struct Entries {
    values: BTreeMap<(usize, usize, usize, usize), f64>,
}

impl Entries {
    fn add(&mut self, matrix: usize, block: usize, i: usize, j: usize, value: f64) {
        let (i, j) = if i >= j { (i, j) } else { (j, i) };
        *self.values.entry((matrix, block, i + 1, j + 1)).or_insert(0.0) += value;
    }

    /// `F_0` for constant `c` at `(i, i)`.
    fn constant(&mut self, block: usize, i: usize, c: f64) {
        self.add(0, block, i, i, -c);
    }
}

fn check_expressible(form: &StandardForm) -> Result<()> {
    if !form.quadratic.is_empty() {
        return Err(CanonError::Unsupported("quadratic rows in SDPA format".into()));
    }
    if !form.objective.p.is_empty() {
        return Err(CanonError::Unsupported("quadratic objective in SDPA format".into()));
    }
    if !form.log_sum_exp.is_empty() {
        return Err(CanonError::Unsupported("log-sum-exp blocks in SDPA format".into()));
    }
    if form.has_integers() || !form.semicontinuous_columns.is_empty() {
        return Err(CanonError::Unsupported("integrality in SDPA format".into()));
    }
    Ok(())
}

/// Linear rows and bounds as the diagonal block; returns its size.
fn linear_block(form: &StandardForm, block: usize, entries: &mut Entries) -> usize {
    let mut row = 0;
    // a'x = b  as  a'x - b >= 0  and  b - a'x >= 0
    for r in 0..form.eq.rows() {
        for sign in [1.0, -1.0] {
            for &(_, c, v) in form.eq.triplets.iter().filter(|t| t.0 == r) {
                entries.add(c + 1, block, row, row, sign * v);
            }
            entries.constant(block, row, -sign * form.eq.rhs[r]);
            row += 1;
        }
    }
    // g'x <= r  as  r - g'x >= 0
    for r in 0..form.ineq.rows() {
        for &(_, c, v) in form.ineq.triplets.iter().filter(|t| t.0 == r) {
            entries.add(c + 1, block, row, row, -v);
        }
        entries.constant(block, row, form.ineq.rhs[r]);
        row += 1;
    }
    for j in 0..form.num_vars {
        if form.lower[j].is_finite() {
            entries.add(j + 1, block, row, row, 1.0);
            entries.constant(block, row, -form.lower[j]);
            row += 1;
        }
        if form.upper[j].is_finite() {
            entries.add(j + 1, block, row, row, -1.0);
            entries.constant(block, row, form.upper[j]);
            row += 1;
        }
    }
    row
}

/// `[s0, s'; s, s0 I] >= 0` for the cone member `s = h - G x`, so
/// `F_i = -arrow(G_i)` and `F_0 = -arrow(h)`.
fn arrow_block(cone: &Block, dim: usize, block: usize, entries: &mut Entries) {
    let mut place = |matrix: usize, k: usize, v: f64| {
        if k == 0 {
            for l in 0..dim {
                entries.add(matrix, block, l, l, v);
            }
        } else {
            entries.add(matrix, block, k, 0, v);
        }
    };
    for &(k, c, v) in &cone.triplets {
        place(c + 1, k, -v);
    }
    for (k, &h) in cone.h.iter().enumerate() {
        place(0, k, -h);
    }
}

/// `mat(h - G x) >= 0`, lower triangle only.
fn semidefinite_block(sdp: &Block, side: usize, block: usize, entries: &mut Entries) {
    for &(k, c, v) in &sdp.triplets {
        let (i, j) = (k % side, k / side);
        if i >= j {
            entries.add(c + 1, block, i, j, -v);
        }
    }
    for (k, &h) in sdp.h.iter().enumerate() {
        let (i, j) = (k % side, k / side);
        if i >= j {
            entries.add(0, block, i, j, -h);
        }
    }
}

/// Render a problem in SDPA sparse format.
pub fn to_sdpa_string(problem: &Problem) -> Result<String> {
    let form = problem.scratch_form()?;
    check_expressible(&form)?;

    let mut entries = Entries::default();
    let mut structure: Vec<i64> = Vec::new();
    let linear = linear_block(&form, 1, &mut entries);
    if linear > 0 {
        structure.push(-(linear as i64));
    }
    for cone in &form.cones {
        let block = structure.len() + 1;
        arrow_block(&cone.block, cone.dim(), block, &mut entries);
        structure.push(cone.dim() as i64);
    }
    for sdp in &form.sdp {
        let block = structure.len() + 1;
        semidefinite_block(&sdp.block, sdp.side, block, &mut entries);
        structure.push(sdp.side as i64);
    }
    if structure.is_empty() || form.num_vars == 0 {
        return Err(CanonError::Unsupported(
            "SDPA needs at least one variable and one block".into(),
        ));
    }

    let sign = if form.objective.sense == ObjectiveSense::Maximize {
        -1.0
    } else {
        1.0
    };
    let mut out = String::new();
    writeln!(
        out,
        "\"cvxcanon: {:?}, objective offset {}\"",
        form.objective.sense, form.objective.offset
    )?;
    writeln!(out, "{}", form.num_vars)?;
    writeln!(out, "{}", structure.len())?;
    let blocks: Vec<String> = structure.iter().map(i64::to_string).collect();
    writeln!(out, "{}", blocks.join(" "))?;
    let costs: Vec<String> = form
        .objective
        .c
        .iter()
        .map(|c| (sign * c + 0.0).to_string())
        .collect();
    writeln!(out, "{}", costs.join(" "))?;
    for ((m, b, i, j), v) in entries.values {
        if v.abs() > DROP_TOL {
            writeln!(out, "{} {} {} {} {}", m, b, i, j, v)?;
        }
    }
    Ok(out)
}
