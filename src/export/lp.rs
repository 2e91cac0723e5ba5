//! CPLEX LP format writer.
//!
//! Handles linear and quadratic rows, bounds and integrality. Cone and
//! semidefinite blocks have no LP rendering.

use std::fmt::Write;

use crate::error::{CanonError, Result};
use crate::model::VariableTable;
use crate::problem::{ObjectiveSense, Problem};
use crate::solver::StandardForm;
use crate::sparse::DROP_TOL;

/// Per-column names: the variable name for scalars, `name_i` otherwise.
pub(crate) fn column_names(table: &VariableTable) -> Vec<String> {
    let mut names = Vec::with_capacity(table.total_width());
    for var in table.iter() {
        if var.width() == 1 {
            names.push(var.name().to_string());
        } else {
            names.extend((0..var.width()).map(|i| format!("{}_{}", var.name(), i)));
        }
    }
    names
}

/// Append ` + a x` terms; returns whether anything was written.
fn linear_terms(out: &mut String, entries: &[(usize, f64)], names: &[String]) -> Result<bool> {
    let mut first = true;
    for &(col, v) in entries {
        if v.abs() <= DROP_TOL {
            continue;
        }
        let sign = if v < 0.0 { "-" } else if first { "" } else { "+" };
        write!(out, " {}{}{} {}", sign, if sign.is_empty() { "" } else { " " }, v.abs(), names[col])?;
        first = false;
    }
    Ok(!first)
}

/// Append `[ ... ]` for `x'Px` with the given factor on every coefficient.
fn quadratic_terms(
    out: &mut String,
    p: &[(usize, usize, f64)],
    factor: f64,
    names: &[String],
) -> Result<()> {
    let mut terms = Vec::new();
    for &(r, c, v) in p {
        if r > c || v.abs() <= DROP_TOL {
            continue;
        }
        // Off-diagonal entries appear twice in the symmetric P.
        let coef = if r == c { factor * v } else { 2.0 * factor * v };
        let product = if r == c {
            format!("{} ^ 2", names[r])
        } else {
            format!("{} * {}", names[r], names[c])
        };
        terms.push((coef, product));
    }
    if terms.is_empty() {
        return Ok(());
    }
    out.push_str(" + [");
    for (k, (coef, product)) in terms.iter().enumerate() {
        let sign = if *coef < 0.0 { "-" } else if k == 0 { "" } else { "+" };
        write!(out, " {}{}{} {}", sign, if sign.is_empty() { "" } else { " " }, coef.abs(), product)?;
    }
    out.push_str(" ]");
    Ok(())
}

/// Drops the sign of negative zero.
fn clean(v: f64) -> f64 {
    v + 0.0
}

fn row_entries(triplets: &[(usize, usize, f64)], rows: usize) -> Vec<Vec<(usize, f64)>> {
    let mut out = vec![Vec::new(); rows];
    for &(r, c, v) in triplets {
        out[r].push((c, v));
    }
    out
}

fn check_expressible(form: &StandardForm) -> Result<()> {
    if !form.cones.is_empty() {
        return Err(CanonError::Unsupported("cone blocks in LP format".into()));
    }
    if !form.sdp.is_empty() {
        return Err(CanonError::Unsupported("semidefinite blocks in LP format".into()));
    }
    if !form.log_sum_exp.is_empty() {
        return Err(CanonError::Unsupported("log-sum-exp blocks in LP format".into()));
    }
    Ok(())
}

/// Render a problem in CPLEX LP format.
pub fn to_lp_string(problem: &Problem) -> Result<String> {
    let form = problem.scratch_form()?;
    check_expressible(&form)?;
    let names = column_names(problem.variables());
    let mut out = String::new();

    writeln!(out, "\\ written by cvxcanon")?;
    out.push_str(match form.objective.sense {
        ObjectiveSense::Maximize => "Maximize\n",
        ObjectiveSense::Minimize | ObjectiveSense::Find => "Minimize\n",
    });
    out.push_str(" obj:");
    let objective: Vec<(usize, f64)> = form.objective.c.iter().copied().enumerate().collect();
    let wrote = linear_terms(&mut out, &objective, &names)?;
    if !form.objective.p.is_empty() {
        let before = out.len();
        // LP halves bracketed objective terms.
        quadratic_terms(&mut out, &form.objective.p, 2.0, &names)?;
        if out.len() > before {
            out.push_str(" / 2");
        }
    }
    if form.objective.offset.abs() > DROP_TOL {
        let sign = if form.objective.offset < 0.0 { "-" } else { "+" };
        write!(out, " {} {}", sign, form.objective.offset.abs())?;
    } else if !wrote && form.objective.p.is_empty() {
        out.push_str(" 0");
    }
    out.push('\n');

    out.push_str("Subject To\n");
    for (r, entries) in row_entries(&form.eq.triplets, form.eq.rows()).iter().enumerate() {
        write!(out, " e{}:", r)?;
        if !linear_terms(&mut out, entries, &names)? {
            write!(out, " 0 {}", names.first().map(String::as_str).unwrap_or("x"))?;
        }
        writeln!(out, " = {}", clean(form.eq.rhs[r]))?;
    }
    let quad_rows: Vec<Option<&[(usize, usize, f64)]>> = {
        let mut rows = vec![None; form.ineq.rows()];
        for q in &form.quadratic {
            rows[q.row] = Some(q.p.as_slice());
        }
        rows
    };
    for (r, entries) in row_entries(&form.ineq.triplets, form.ineq.rows()).iter().enumerate() {
        let prefix = if quad_rows[r].is_some() { "q" } else { "i" };
        write!(out, " {}{}:", prefix, r)?;
        let wrote = linear_terms(&mut out, entries, &names)?;
        if let Some(p) = quad_rows[r] {
            quadratic_terms(&mut out, p, 1.0, &names)?;
        } else if !wrote {
            write!(out, " 0 {}", names.first().map(String::as_str).unwrap_or("x"))?;
        }
        writeln!(out, " <= {}", clean(form.ineq.rhs[r]))?;
    }

    out.push_str("Bounds\n");
    for (j, name) in names.iter().enumerate() {
        let (l, u) = (form.lower[j], form.upper[j]);
        if l == f64::NEG_INFINITY && u == f64::INFINITY {
            writeln!(out, " {} free", name)?;
        } else if l == u {
            writeln!(out, " {} = {}", name, clean(l))?;
        } else {
            writeln!(out, " {} <= {} <= {}", clean(l), name, clean(u))?;
        }
    }

    let generals: Vec<usize> = form
        .integer_columns
        .iter()
        .copied()
        .filter(|c| !form.binary_columns.contains(c))
        .collect();
    for (title, cols) in [
        ("Generals", &generals),
        ("Binaries", &form.binary_columns),
        ("Semi-continuous", &form.semicontinuous_columns),
    ] {
        if cols.is_empty() {
            continue;
        }
        writeln!(out, "{}", title)?;
        for &c in cols.iter() {
            writeln!(out, " {}", names[c])?;
        }
    }
    out.push_str("End\n");
    Ok(out)
}
