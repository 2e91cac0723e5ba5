//! The variable table: declared variables and their flat index ranges.
//!
//! Variables are kept in declaration order. Each one owns a contiguous range
//! `[start, end)` of the flat coordinate space; ranges never overlap and their
//! union is always `[0, total_width)`.

use std::collections::{BTreeSet, HashMap};

use crate::error::{CanonError, Result};
use crate::expr::{VarKind, Variable, VariableBuilder};
use crate::solver::Backend;

/// All declared variables of a problem.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    vars: Vec<Variable>,
    index: HashMap<String, usize>,
    total_width: usize,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new variable at the end of the coordinate space.
    pub fn declare(&mut self, decl: VariableBuilder) -> Result<&Variable> {
        if self.index.contains_key(&decl.name) {
            return Err(CanonError::DuplicateName(decl.name));
        }
        if decl.kind == VarKind::Symmetric && !decl.shape.is_square() {
            return Err(CanonError::shape(
                "square shape for a symmetric variable",
                decl.shape.to_string(),
            ));
        }

        let width = decl.kind.width(decl.shape);
        let expand = |spec: &Option<crate::expr::BoundSpec>| -> Result<Option<Vec<f64>>> {
            match spec {
                None => Ok(None),
                Some(s) => s
                    .expand(width)
                    .map(Some)
                    .ok_or_else(|| CanonError::shape(format!("{} bounds", width), "bounds of another length")),
            }
        };
        let mut lower = expand(&decl.lower)?;
        let mut upper = expand(&decl.upper)?;
        if decl.kind == VarKind::Binary {
            lower = Some(tightened(lower, width, 0.0, f64::max));
            upper = Some(tightened(upper, width, 1.0, f64::min));
        }

        let start = self.total_width;
        let variable = Variable {
            name: decl.name,
            shape: decl.shape,
            kind: decl.kind,
            lower,
            upper,
            start,
            end: start + width,
            tags: BTreeSet::new(),
        };
        self.total_width += width;
        self.index.insert(variable.name.clone(), self.vars.len());
        self.vars.push(variable);

        let variable = &self.vars[self.vars.len() - 1];
        tracing::debug!(
            component = "variables",
            operation = "declare",
            name = %variable.name,
            kind = ?variable.kind,
            start = variable.start,
            end = variable.end,
            "Declared variable"
        );
        Ok(variable)
    }

    /// Remove a variable and shift every later range down by its width.
    pub fn retract(&mut self, name: &str) -> Result<Variable> {
        let pos = self
            .index
            .get(name)
            .copied()
            .ok_or_else(|| CanonError::UnknownVariable(name.to_string()))?;
        let removed = self.vars.remove(pos);
        self.renumber();
        tracing::debug!(
            component = "variables",
            operation = "retract",
            name = %removed.name,
            width = removed.width(),
            total_width = self.total_width,
            "Retracted variable"
        );
        Ok(removed)
    }

    /// Recompute every range and the name index from declaration order.
    ///
    /// This is the only place ranges are shifted.
    pub fn renumber(&mut self) {
        let mut offset = 0;
        self.index.clear();
        for (pos, var) in self.vars.iter_mut().enumerate() {
            let width = var.kind.width(var.shape);
            var.start = offset;
            var.end = offset + width;
            offset += width;
            self.index.insert(var.name.clone(), pos);
        }
        self.total_width = offset;
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.index.get(name).map(|&pos| &self.vars[pos])
    }

    /// Like `get`, but an absent name is an error.
    pub fn require(&self, name: &str) -> Result<&Variable> {
        self.get(name)
            .ok_or_else(|| CanonError::UnknownVariable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Position of a variable in declaration order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Variables in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Width of the whole flat coordinate space.
    pub fn total_width(&self) -> usize {
        self.total_width
    }

    /// Flat lower bounds, `-inf` where none is declared.
    pub fn lower_bounds(&self) -> Vec<f64> {
        self.flat_bounds(|v| v.lower.as_deref(), f64::NEG_INFINITY)
    }

    /// Flat upper bounds, `+inf` where none is declared.
    pub fn upper_bounds(&self) -> Vec<f64> {
        self.flat_bounds(|v| v.upper.as_deref(), f64::INFINITY)
    }

    fn flat_bounds<'a>(&'a self, pick: impl Fn(&'a Variable) -> Option<&'a [f64]>, default: f64) -> Vec<f64> {
        let mut out = vec![default; self.total_width];
        for var in &self.vars {
            if let Some(vals) = pick(var) {
                out[var.start..var.end].copy_from_slice(vals);
            }
        }
        out
    }

    /// Flat columns restricted to integers (binary columns included).
    pub fn integer_columns(&self) -> Vec<usize> {
        self.columns_where(|k| k.is_integral())
    }

    /// Flat columns of binary variables.
    pub fn binary_columns(&self) -> Vec<usize> {
        self.columns_where(|k| k == VarKind::Binary)
    }

    fn columns_where(&self, pred: impl Fn(VarKind) -> bool) -> Vec<usize> {
        self.vars
            .iter()
            .filter(|v| pred(v.kind))
            .flat_map(|v| v.start..v.end)
            .collect()
    }

    /// Flat columns of semicontinuous and semi-integer variables.
    pub fn semicontinuous_columns(&self) -> Vec<usize> {
        self.columns_where(|k| matches!(k, VarKind::SemiContinuous | VarKind::SemiInteger))
    }

    /// Mark a variable as materialized for `backend`.
    pub(crate) fn tag(&mut self, pos: usize, backend: Backend) {
        self.vars[pos].tags.insert(backend);
    }

    /// Drop every materialization tag of every backend.
    pub(crate) fn clear_tags(&mut self) {
        for var in &mut self.vars {
            var.tags.clear();
        }
    }
}

fn tightened(bounds: Option<Vec<f64>>, width: usize, limit: f64, pick: fn(f64, f64) -> f64) -> Vec<f64> {
    match bounds {
        Some(vals) => vals.into_iter().map(|v| pick(v, limit)).collect(),
        None => vec![limit; width],
    }
}
