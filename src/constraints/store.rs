//! Ordered constraint storage with group numbering and running totals.
//!
//! Every top-level `add` or `add_group` call records one group descriptor
//! `(first, last, label)`. Descriptors are used only to resolve
//! `(group, item)` lookups; the numeric encoding walks the flat sequence.

use std::collections::BTreeSet;

use super::constraint::{Constraint, ConstraintKind};
use crate::error::{CanonError, Result};
use crate::solver::Backend;

/// Running per-kind totals over the stored constraints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstraintTotals {
    pub linear: usize,
    pub cone: usize,
    pub quadratic: usize,
    pub semidefinite: usize,
    pub log_sum_exp: usize,
    /// Rows contributed by linear constraints.
    pub affine_rows: usize,
    /// `w + 1` per second-order cone, `w + 2` per rotated cone.
    pub cone_vars: usize,
    /// `n(n+1)/2` per semidefinite constraint of side `n`.
    pub sdp_vars: usize,
    /// Nonzero bilinear coefficients of quadratic constraints.
    pub quad_nnz: usize,
    /// Argument width of log-sum-exp constraints.
    pub lse_vars: usize,
}

impl ConstraintTotals {
    /// What a single constraint contributes.
    pub fn of(constraint: &Constraint) -> Self {
        let mut t = ConstraintTotals::default();
        let w = constraint.shape().size();
        match constraint {
            Constraint::Linear { .. } => {
                t.linear = 1;
                t.affine_rows = w;
            }
            Constraint::SecondOrderCone { .. } => {
                t.cone = 1;
                t.cone_vars = w + 1;
            }
            Constraint::RotatedCone { .. } => {
                t.cone = 1;
                t.cone_vars = w + 2;
            }
            Constraint::Semidefinite { lhs, .. } => {
                let n = lhs.shape.rows();
                t.semidefinite = 1;
                t.sdp_vars = n * (n + 1) / 2;
            }
            Constraint::Quadratic { expr } => {
                t.quadratic = 1;
                t.quad_nnz = expr.quad_nnz();
            }
            Constraint::LogSumExp { .. } => {
                t.log_sum_exp = 1;
                t.lse_vars = w;
            }
        }
        t
    }

    /// Number of constraints of a kind.
    pub fn count(&self, kind: ConstraintKind) -> usize {
        match kind {
            ConstraintKind::Linear => self.linear,
            ConstraintKind::Cone => self.cone,
            ConstraintKind::Quadratic => self.quadratic,
            ConstraintKind::Semidefinite => self.semidefinite,
            ConstraintKind::LogSumExp => self.log_sum_exp,
        }
    }

    fn fields_mut(&mut self) -> [&mut usize; 10] {
        [
            &mut self.linear,
            &mut self.cone,
            &mut self.quadratic,
            &mut self.semidefinite,
            &mut self.log_sum_exp,
            &mut self.affine_rows,
            &mut self.cone_vars,
            &mut self.sdp_vars,
            &mut self.quad_nnz,
            &mut self.lse_vars,
        ]
    }

    fn add(&mut self, mut other: ConstraintTotals) {
        for (a, b) in self.fields_mut().into_iter().zip(other.fields_mut()) {
            *a += *b;
        }
    }

    fn sub(&mut self, mut other: ConstraintTotals) {
        for (a, b) in self.fields_mut().into_iter().zip(other.fields_mut()) {
            *a -= *b;
        }
    }
}

/// A stored constraint with its key and materialization tags.
#[derive(Debug, Clone)]
pub struct StoredConstraint {
    pub constraint: Constraint,
    pub key: Option<String>,
    pub(crate) tags: BTreeSet<Backend>,
}

impl StoredConstraint {
    /// Whether this constraint has been materialized for `backend`.
    pub fn is_tagged(&self, backend: Backend) -> bool {
        self.tags.contains(&backend)
    }
}

/// Flat range of one top-level addition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescriptor {
    pub first: usize,
    pub last: usize,
    pub label: Option<String>,
    pub key: Option<String>,
}

impl GroupDescriptor {
    pub fn len(&self) -> usize {
        self.last + 1 - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }

    fn contains(&self, index: usize) -> bool {
        self.first <= index && index <= self.last
    }
}

/// Address of one or more stored constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintIndex {
    /// Position in the flat sequence.
    Flat(usize),
    /// A whole group.
    Group(usize),
    /// Item `i` of group `g`.
    Item(usize, usize),
}

/// Handle returned by additions: the flat position at insertion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintHandle(pub usize);

impl From<ConstraintHandle> for ConstraintIndex {
    fn from(handle: ConstraintHandle) -> Self {
        ConstraintIndex::Flat(handle.0)
    }
}

/// A batch for `add_group`: a constraint or a nested group.
#[derive(Debug, Clone)]
pub enum Batch {
    One(Constraint),
    Group {
        items: Vec<Batch>,
        label: Option<String>,
    },
}

impl From<Constraint> for Batch {
    fn from(c: Constraint) -> Self {
        Batch::One(c)
    }
}

/// Ordered collection of constraints.
#[derive(Debug, Clone, Default)]
pub struct ConstraintStore {
    entries: Vec<StoredConstraint>,
    groups: Vec<GroupDescriptor>,
    totals: ConstraintTotals,
}

impl ConstraintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a constraint at the next sequence position.
    pub fn add(&mut self, constraint: Constraint, key: Option<String>) -> ConstraintHandle {
        let index = self.push(constraint, key.clone());
        self.groups.push(GroupDescriptor {
            first: index,
            last: index,
            label: None,
            key,
        });
        ConstraintHandle(index)
    }

    /// Append a batch as one logical group.
    ///
    /// Nested groups are flattened; only the outermost descriptor survives.
    pub fn add_group(
        &mut self,
        items: Vec<Batch>,
        label: Option<String>,
        key: Option<String>,
    ) -> Vec<ConstraintHandle> {
        let first = self.entries.len();
        let groups_before = self.groups.len();
        for item in items {
            match item {
                Batch::One(c) => {
                    self.push(c, None);
                }
                Batch::Group { items, label } => {
                    self.add_group(items, label, None);
                }
            }
        }
        let end = self.entries.len();
        if end == first {
            return Vec::new();
        }
        self.prune_nested(groups_before, first, end - 1);
        self.groups.push(GroupDescriptor {
            first,
            last: end - 1,
            label,
            key,
        });
        tracing::debug!(
            component = "constraints",
            operation = "add_group",
            first,
            last = end - 1,
            "Added constraint group"
        );
        (first..end).map(ConstraintHandle).collect()
    }

    fn push(&mut self, constraint: Constraint, key: Option<String>) -> usize {
        self.totals.add(ConstraintTotals::of(&constraint));
        tracing::debug!(
            component = "constraints",
            operation = "add",
            index = self.entries.len(),
            kind = ?constraint.kind(),
            "Added constraint"
        );
        self.entries.push(StoredConstraint {
            constraint,
            key,
            tags: BTreeSet::new(),
        });
        self.entries.len() - 1
    }

    /// Drop descriptors recorded since `from` that lie inside `[first, last]`.
    fn prune_nested(&mut self, from: usize, first: usize, last: usize) {
        let mut pos = from;
        while pos < self.groups.len() {
            let g = &self.groups[pos];
            if g.first >= first && g.last <= last {
                self.groups.remove(pos);
            } else {
                pos += 1;
            }
        }
    }

    /// Resolve an index to a contiguous slice of constraints.
    pub fn get(&self, index: ConstraintIndex) -> Result<&[StoredConstraint]> {
        let (first, last) = self.resolve(index)?;
        Ok(&self.entries[first..=last])
    }

    /// Constraint at a flat position.
    pub fn constraint(&self, index: usize) -> Result<&StoredConstraint> {
        self.entries
            .get(index)
            .ok_or_else(|| CanonError::IndexError(format!("{} (have {})", index, self.entries.len())))
    }

    /// Find a constraint or group by key.
    pub fn find_key(&self, key: &str) -> Result<ConstraintIndex> {
        self.groups
            .iter()
            .enumerate()
            .find(|(_, g)| g.key.as_deref() == Some(key))
            .map(|(pos, g)| {
                if g.len() > 1 {
                    ConstraintIndex::Group(pos)
                } else {
                    ConstraintIndex::Flat(g.first)
                }
            })
            .ok_or_else(|| CanonError::UnknownConstraint(key.to_string()))
    }

    fn resolve(&self, index: ConstraintIndex) -> Result<(usize, usize)> {
        match index {
            ConstraintIndex::Flat(i) => {
                if i < self.entries.len() {
                    Ok((i, i))
                } else {
                    Err(CanonError::IndexError(format!("{} (have {})", i, self.entries.len())))
                }
            }
            ConstraintIndex::Group(g) => {
                let group = self.group(g)?;
                Ok((group.first, group.last))
            }
            ConstraintIndex::Item(g, i) => {
                let group = self.group(g)?;
                if i < group.len() {
                    Ok((group.first + i, group.first + i))
                } else {
                    Err(CanonError::IndexError(format!("({}, {}) (group has {})", g, i, group.len())))
                }
            }
        }
    }

    fn group(&self, g: usize) -> Result<&GroupDescriptor> {
        self.groups
            .get(g)
            .ok_or_else(|| CanonError::IndexError(format!("group {} (have {})", g, self.groups.len())))
    }

    /// Remove the addressed constraints and return them.
    pub fn remove(&mut self, index: ConstraintIndex) -> Result<Vec<StoredConstraint>> {
        let (first, last) = self.resolve(index)?;
        let width = last + 1 - first;

        match index {
            ConstraintIndex::Group(g) => {
                self.groups.remove(g);
            }
            _ => {
                if let Some(pos) = self.groups.iter().position(|g| g.contains(first)) {
                    if self.groups[pos].len() == 1 {
                        self.groups.remove(pos);
                    } else {
                        self.groups[pos].last -= 1;
                    }
                }
            }
        }
        self.renumber_groups(first, width);

        let removed: Vec<StoredConstraint> = self.entries.drain(first..=last).collect();
        for entry in &removed {
            self.totals.sub(ConstraintTotals::of(&entry.constraint));
        }
        tracing::debug!(
            component = "constraints",
            operation = "remove",
            first,
            width,
            remaining = self.entries.len(),
            "Removed constraints"
        );
        Ok(removed)
    }

    /// Shift every descriptor after `removed_at` left by `width`.
    fn renumber_groups(&mut self, removed_at: usize, width: usize) {
        for g in &mut self.groups {
            if g.first > removed_at {
                g.first -= width;
                g.last -= width;
            }
        }
    }

    /// Totals maintained incrementally.
    pub fn totals(&self) -> ConstraintTotals {
        self.totals
    }

    /// Totals recomputed from the current constraints.
    pub fn recount(&self) -> ConstraintTotals {
        let mut totals = ConstraintTotals::default();
        for entry in &self.entries {
            totals.add(ConstraintTotals::of(&entry.constraint));
        }
        totals
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredConstraint> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Group descriptors in insertion order.
    pub fn groups(&self) -> &[GroupDescriptor] {
        &self.groups
    }

    pub(crate) fn tag(&mut self, index: usize, backend: Backend) {
        self.entries[index].tags.insert(backend);
    }

    pub(crate) fn clear_tags(&mut self) {
        for entry in &mut self.entries {
            entry.tags.clear();
        }
    }
}
