//! Conic Benchmark Format (CBF) writer.
//!
//! CBF states scalar constraints as `A x + F(X) + b` in a product of cones
//! (`L=`, `L+`, `Q`, `QR`) and matrix constraints as
//! `sum_j x_j H_j + D >= 0`. A symmetric variable whose only semidefinite
//! constraint is `X >= 0` itself is written as a `PSDVAR`; every other
//! column is a free scalar `VAR`. Matrix coordinates are 0-based, lower
//! triangle only.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::error::{CanonError, Result};
use crate::expr::{packed_index, VarKind, Variable};
use crate::model::VariableTable;
use crate::problem::{ObjectiveSense, Problem};
use crate::solver::{Block, ConeKind, StandardForm};
use crate::sparse::DROP_TOL;

/// Where a flat column lands in the file.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Column {
    Scalar(usize),
    /// Entry `(k, l)`, `k >= l`, of matrix variable `var`.
    Matrix { var: usize, k: usize, l: usize },
}

#[derive(Debug, Default)]
struct Layout {
    columns: Vec<Column>,
    scalars: usize,
    matrix_sides: Vec<usize>,
    /// SDP blocks absorbed into a matrix variable.
    absorbed: BTreeSet<usize>,
}

/// `member = vec(X)` exactly, with `G` holding the negated expansion.
fn is_plain_psd(block: &Block, var: &Variable) -> bool {
    let n = var.shape().rows();
    if block.rows() != n * n || block.h.iter().any(|h| h.abs() > DROP_TOL) {
        return false;
    }
    let mut got: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for &(r, c, v) in &block.triplets {
        *got.entry((r, c)).or_insert(0.0) += v;
    }
    got.retain(|_, v| v.abs() > DROP_TOL);
    got.len() == n * n
        && (0..n * n).all(|k| {
            let col = var.start() + var.slot(k % n, k / n);
            got.get(&(k, col)).map_or(false, |v| (v + 1.0).abs() <= DROP_TOL)
        })
}

fn layout(form: &StandardForm, table: &VariableTable) -> Layout {
    let mut owner: Vec<Option<(usize, usize, usize)>> = vec![None; form.num_vars];
    let mut out = Layout::default();

    for var in table.iter().filter(|v| v.kind() == VarKind::Symmetric) {
        let cols = var.start()..var.end();
        if cols.clone().any(|c| form.lower[c].is_finite() || form.upper[c].is_finite()) {
            continue;
        }
        let touching: Vec<usize> = form
            .sdp
            .iter()
            .enumerate()
            .filter(|(_, s)| s.block.triplets.iter().any(|t| cols.contains(&t.1)))
            .map(|(i, _)| i)
            .collect();
        let &[only] = touching.as_slice() else {
            continue;
        };
        if out.absorbed.contains(&only) || !is_plain_psd(&form.sdp[only].block, var) {
            continue;
        }
        let n = var.shape().rows();
        let index = out.matrix_sides.len();
        for l in 0..n {
            for k in l..n {
                owner[var.start() + packed_index(n, k, l)] = Some((index, k, l));
            }
        }
        out.matrix_sides.push(n);
        out.absorbed.insert(only);
    }

    for slot in owner {
        out.columns.push(match slot {
            Some((var, k, l)) => Column::Matrix { var, k, l },
            None => {
                out.scalars += 1;
                Column::Scalar(out.scalars - 1)
            }
        });
    }
    out
}

/// Coordinate lists, keyed so that output order is deterministic.
#[derive(Debug, Default)]
struct Coords {
    obj_f: BTreeMap<(usize, usize, usize), f64>,
    obj_a: BTreeMap<usize, f64>,
    f: BTreeMap<(usize, usize, usize, usize), f64>,
    a: BTreeMap<(usize, usize), f64>,
    b: BTreeMap<usize, f64>,
    h: BTreeMap<(usize, usize, usize, usize), f64>,
    d: BTreeMap<(usize, usize, usize), f64>,
}

impl Coords {
    /// `value` times column `col` in scalar row `row`.
    ///
    /// A packed off-diagonal slot is `X_kl = X_lk`, so `<F, X>` splits its
    /// coefficient over both halves.
    fn row_term(&mut self, layout: &Layout, row: usize, col: usize, value: f64) {
        match layout.columns[col] {
            Column::Scalar(j) => *self.a.entry((row, j)).or_insert(0.0) += value,
            Column::Matrix { var, k, l } => {
                let v = if k == l { value } else { 0.5 * value };
                *self.f.entry((row, var, k, l)).or_insert(0.0) += v;
            }
        }
    }

    fn objective_term(&mut self, layout: &Layout, col: usize, value: f64) {
        match layout.columns[col] {
            Column::Scalar(j) => *self.obj_a.entry(j).or_insert(0.0) += value,
            Column::Matrix { var, k, l } => {
                let v = if k == l { value } else { 0.5 * value };
                *self.obj_f.entry((var, k, l)).or_insert(0.0) += v;
            }
        }
    }

    fn constant(&mut self, row: usize, value: f64) {
        *self.b.entry(row).or_insert(0.0) += value;
    }
}

/// Scalar constraint cones in file order.
fn scalar_rows(
    form: &StandardForm,
    layout: &Layout,
    coords: &mut Coords,
) -> Vec<(&'static str, usize)> {
    let mut chunks = Vec::new();
    let mut row = 0;

    // a'x = r  as  a'x - r in L=
    for &(r, c, v) in &form.eq.triplets {
        coords.row_term(layout, row + r, c, v);
    }
    for (r, &rhs) in form.eq.rhs.iter().enumerate() {
        coords.constant(row + r, -rhs);
    }
    chunks.push(("L=", form.eq.rows()));
    row += form.eq.rows();

    // g'x <= r  as  r - g'x in L+, then the finite bounds
    let start = row;
    for &(r, c, v) in &form.ineq.triplets {
        coords.row_term(layout, row + r, c, -v);
    }
    for (r, &rhs) in form.ineq.rhs.iter().enumerate() {
        coords.constant(row + r, rhs);
    }
    row += form.ineq.rows();
    for j in 0..form.num_vars {
        if form.lower[j].is_finite() {
            coords.row_term(layout, row, j, 1.0);
            coords.constant(row, -form.lower[j]);
            row += 1;
        }
        if form.upper[j].is_finite() {
            coords.row_term(layout, row, j, -1.0);
            coords.constant(row, form.upper[j]);
            row += 1;
        }
    }
    chunks.push(("L+", row - start));

    // h - G x in Q. A rotated member [t; s; w] becomes [t + s; (t - s) / 2; w]
    // so that 2 u v >= ||w||^2 reads E2 E3 >= ||E1||^2.
    for cone in &form.cones {
        let rotated = cone.kind == ConeKind::Rotated;
        let place = |k: usize, v: f64| -> Vec<(usize, f64)> {
            match (rotated, k) {
                (true, 0) => vec![(0, v), (1, 0.5 * v)],
                (true, 1) => vec![(0, v), (1, -0.5 * v)],
                _ => vec![(k, v)],
            }
        };
        for &(k, c, v) in &cone.block.triplets {
            for (r, w) in place(k, -v) {
                coords.row_term(layout, row + r, c, w);
            }
        }
        for (k, &h) in cone.block.h.iter().enumerate() {
            for (r, w) in place(k, h) {
                coords.constant(row + r, w);
            }
        }
        chunks.push((if rotated { "QR" } else { "Q" }, cone.dim()));
        row += cone.dim();
    }

    chunks.retain(|&(_, dim)| dim > 0);
    chunks
}

/// Semidefinite blocks not absorbed into a matrix variable; returns sides.
fn matrix_rows(form: &StandardForm, layout: &Layout, coords: &mut Coords) -> Result<Vec<usize>> {
    let mut sides = Vec::new();
    for (s, sdp) in form.sdp.iter().enumerate() {
        if layout.absorbed.contains(&s) {
            continue;
        }
        let con = sides.len();
        let n = sdp.side;
        for &(k, c, v) in &sdp.block.triplets {
            let (i, j) = (k % n, k / n);
            if i < j {
                continue;
            }
            match layout.columns[c] {
                Column::Scalar(x) => *coords.h.entry((con, x, i, j)).or_insert(0.0) -= v,
                Column::Matrix { .. } => {
                    return Err(CanonError::Unsupported(
                        "matrix variable inside a semidefinite constraint in CBF format".into(),
                    ))
                }
            }
        }
        for (k, &h) in sdp.block.h.iter().enumerate() {
            let (i, j) = (k % n, k / n);
            if i >= j {
                *coords.d.entry((con, i, j)).or_insert(0.0) += h;
            }
        }
        sides.push(n);
    }
    Ok(sides)
}

fn check_expressible(form: &StandardForm) -> Result<()> {
    if !form.quadratic.is_empty() || !form.objective.p.is_empty() {
        return Err(CanonError::Unsupported("quadratic content in CBF format".into()));
    }
    if !form.log_sum_exp.is_empty() {
        return Err(CanonError::Unsupported("log-sum-exp blocks in CBF format".into()));
    }
    if !form.semicontinuous_columns.is_empty() {
        return Err(CanonError::Unsupported("semicontinuous columns in CBF format".into()));
    }
    Ok(())
}

/// Write a keyword section: the keyword, a header line and one line per entry.
fn section<K, F>(out: &mut String, keyword: &str, entries: &BTreeMap<K, f64>, line: F) -> Result<()>
where
    F: Fn(&K, f64) -> String,
{
    let kept: Vec<(&K, f64)> = entries
        .iter()
        .filter(|(_, v)| v.abs() > DROP_TOL)
        .map(|(k, v)| (k, *v + 0.0))
        .collect();
    if kept.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}", keyword)?;
    writeln!(out, "{}", kept.len())?;
    for (k, v) in kept {
        writeln!(out, "{}", line(k, v))?;
    }
    writeln!(out)?;
    Ok(())
}

/// Render a problem in CBF version 3.
pub fn to_cbf_string(problem: &Problem) -> Result<String> {
    let form = problem.scratch_form()?;
    check_expressible(&form)?;
    let layout = layout(&form, problem.variables());

    let mut coords = Coords::default();
    let chunks = scalar_rows(&form, &layout, &mut coords);
    let psd_cons = matrix_rows(&form, &layout, &mut coords)?;
    if form.objective.sense != ObjectiveSense::Find {
        for (j, &c) in form.objective.c.iter().enumerate() {
            coords.objective_term(&layout, j, c);
        }
    }

    let mut out = String::new();
    writeln!(out, "# written by cvxcanon")?;
    writeln!(out, "VER\n3\n")?;
    let sense = match form.objective.sense {
        ObjectiveSense::Maximize => "MAX",
        ObjectiveSense::Minimize | ObjectiveSense::Find => "MIN",
    };
    writeln!(out, "OBJSENSE\n{}\n", sense)?;

    if !layout.matrix_sides.is_empty() {
        writeln!(out, "PSDVAR\n{}", layout.matrix_sides.len())?;
        for n in &layout.matrix_sides {
            writeln!(out, "{}", n)?;
        }
        writeln!(out)?;
    }
    if layout.scalars > 0 {
        writeln!(out, "VAR\n{} 1\nF {}\n", layout.scalars, layout.scalars)?;
    }

    let integers: Vec<usize> = form
        .integer_columns
        .iter()
        .filter_map(|&c| match layout.columns[c] {
            Column::Scalar(j) => Some(j),
            Column::Matrix { .. } => None,
        })
        .collect();
    if !integers.is_empty() {
        writeln!(out, "INT\n{}", integers.len())?;
        for j in integers {
            writeln!(out, "{}", j)?;
        }
        writeln!(out)?;
    }

    if !psd_cons.is_empty() {
        writeln!(out, "PSDCON\n{}", psd_cons.len())?;
        for n in &psd_cons {
            writeln!(out, "{}", n)?;
        }
        writeln!(out)?;
    }
    if !chunks.is_empty() {
        let rows: usize = chunks.iter().map(|c| c.1).sum();
        writeln!(out, "CON\n{} {}", rows, chunks.len())?;
        for (cone, dim) in &chunks {
            writeln!(out, "{} {}", cone, dim)?;
        }
        writeln!(out)?;
    }

    section(&mut out, "OBJFCOORD", &coords.obj_f, |(j, k, l), v| {
        format!("{} {} {} {}", j, k, l, v)
    })?;
    section(&mut out, "OBJACOORD", &coords.obj_a, |j, v| format!("{} {}", j, v))?;
    let offset = form.objective.offset;
    if form.objective.sense != ObjectiveSense::Find && offset.abs() > DROP_TOL {
        writeln!(out, "OBJBCOORD\n{}\n", offset)?;
    }
    section(&mut out, "FCOORD", &coords.f, |(r, j, k, l), v| {
        format!("{} {} {} {} {}", r, j, k, l, v)
    })?;
    section(&mut out, "ACOORD", &coords.a, |(r, j), v| format!("{} {} {}", r, j, v))?;
    section(&mut out, "BCOORD", &coords.b, |r, v| format!("{} {}", r, v))?;
    section(&mut out, "HCOORD", &coords.h, |(i, j, k, l), v| {
        format!("{} {} {} {} {}", i, j, k, l, v)
    })?;
    section(&mut out, "DCOORD", &coords.d, |(i, k, l), v| {
        format!("{} {} {} {}", i, k, l, v)
    })?;
    Ok(out)
}
