//! The problem aggregate: variables, constraints, objective and the
//! per-backend sessions derived from them.
//!
//! ```ignore
//! let mut problem = Problem::new();
//! let x = problem.add_variable(VariableBuilder::vector("x", 2).nonneg())?;
//! problem.add_constraint(x.sum().leq(&AffineExpr::scalar(1.0))?)?;
//! problem.maximize(x.dot(&[1.0, 2.0])?)?;
//! let solution = problem.solve()?;
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::config::Options;
use crate::constraints::{
    Batch, Constraint, ConstraintHandle, ConstraintIndex, ConstraintStore, ConstraintTotals,
    StoredConstraint,
};
use crate::error::{CanonError, Result};
use crate::expr::{AffineExpr, QuadExpr, Shape, Variable, VariableBuilder};
use crate::model::VariableTable;
use crate::solver::{self, Backend, BackendSession, Solution, StandardForm};

/// Direction of optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectiveSense {
    #[default]
    Minimize,
    Maximize,
    /// Feasibility only; the objective expression is ignored.
    Find,
}

/// Objective expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Objective {
    Affine(AffineExpr),
    Quadratic(QuadExpr),
}

impl Objective {
    /// Names of the variables the objective references.
    pub fn variables(&self) -> BTreeSet<&str> {
        match self {
            Objective::Affine(e) => e.variables().collect(),
            Objective::Quadratic(q) => q.variables(),
        }
    }

    pub fn is_quadratic(&self) -> bool {
        match self {
            Objective::Affine(_) => false,
            Objective::Quadratic(q) => !q.is_affine(),
        }
    }
}

impl Default for Objective {
    fn default() -> Self {
        Objective::Affine(AffineExpr::zeros(Shape::scalar()))
    }
}

impl From<AffineExpr> for Objective {
    fn from(e: AffineExpr) -> Self {
        Objective::Affine(e)
    }
}

impl From<QuadExpr> for Objective {
    fn from(q: QuadExpr) -> Self {
        Objective::Quadratic(q)
    }
}

/// An optimization problem under incremental construction.
#[derive(Debug, Clone, Default)]
pub struct Problem {
    sense: ObjectiveSense,
    objective: Objective,
    variables: VariableTable,
    constraints: ConstraintStore,
    sessions: BTreeMap<Backend, BackendSession>,
    options: Options,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: Options) -> Self {
        Problem {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Replace the options. A change of encoding policy drops every session.
    pub fn set_options(&mut self, options: Options) {
        let policy_changed = options.encoding_policy() != self.options.encoding_policy();
        self.options = options;
        if policy_changed {
            self.invalidate();
        }
    }

    pub fn sense(&self) -> ObjectiveSense {
        self.sense
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    pub fn constraints(&self) -> &ConstraintStore {
        &self.constraints
    }

    /// Running constraint totals.
    pub fn totals(&self) -> ConstraintTotals {
        self.constraints.totals()
    }

    /// Declare a variable and return the expression equal to it.
    pub fn add_variable(&mut self, decl: VariableBuilder) -> Result<AffineExpr> {
        let var = self.variables.declare(decl)?;
        Ok(AffineExpr::variable(var))
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Expression of a declared variable.
    pub fn var(&self, name: &str) -> Result<AffineExpr> {
        Ok(AffineExpr::variable(self.variables.require(name)?))
    }

    /// Remove a variable no constraint or objective refers to.
    pub fn remove_variable(&mut self, name: &str) -> Result<Variable> {
        self.variables.require(name)?;
        if self.objective.variables().contains(name)
            || self
                .constraints
                .iter()
                .any(|c| c.constraint.variables().contains(name))
        {
            return Err(CanonError::InUse(name.to_string()));
        }
        let removed = self.variables.retract(name)?;
        self.invalidate();
        Ok(removed)
    }

    fn check_references(&self, constraint: &Constraint) -> Result<()> {
        for name in constraint.variables() {
            self.variables.require(name)?;
        }
        Ok(())
    }

    fn check_batch(&self, items: &[Batch]) -> Result<()> {
        for item in items {
            match item {
                Batch::One(c) => self.check_references(c)?,
                Batch::Group { items, .. } => self.check_batch(items)?,
            }
        }
        Ok(())
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintHandle> {
        self.check_references(&constraint)?;
        Ok(self.constraints.add(constraint, None))
    }

    /// Add a constraint retrievable by `key`.
    pub fn add_keyed_constraint(
        &mut self,
        key: impl Into<String>,
        constraint: Constraint,
    ) -> Result<ConstraintHandle> {
        self.check_references(&constraint)?;
        Ok(self.constraints.add(constraint, Some(key.into())))
    }

    /// Add a batch of constraints as one group.
    pub fn add_group(
        &mut self,
        items: Vec<Batch>,
        label: Option<&str>,
    ) -> Result<Vec<ConstraintHandle>> {
        self.check_batch(&items)?;
        Ok(self
            .constraints
            .add_group(items, label.map(str::to_string), None))
    }

    /// Add a batch of constraints as one group retrievable by `key`.
    pub fn add_keyed_group(
        &mut self,
        key: impl Into<String>,
        items: Vec<Batch>,
        label: Option<&str>,
    ) -> Result<Vec<ConstraintHandle>> {
        self.check_batch(&items)?;
        Ok(self
            .constraints
            .add_group(items, label.map(str::to_string), Some(key.into())))
    }

    pub fn constraint(&self, index: impl Into<ConstraintIndex>) -> Result<&[StoredConstraint]> {
        self.constraints.get(index.into())
    }

    pub fn find_constraint(&self, key: &str) -> Result<ConstraintIndex> {
        self.constraints.find_key(key)
    }

    /// Remove constraints, then sweep out every variable that no remaining
    /// constraint nor the objective refers to.
    ///
    /// The sweep covers all declared variables, including ones never used,
    /// and is skipped when `Options::prune_dangling` is off.
    pub fn remove_constraint(&mut self, index: impl Into<ConstraintIndex>) -> Result<Vec<Constraint>> {
        let removed: Vec<Constraint> = self
            .constraints
            .remove(index.into())?
            .into_iter()
            .map(|s| s.constraint)
            .collect();

        if self.options.prune_dangling {
            let dangling = self.dangling_variables();
            for name in &dangling {
                self.variables.retract(name)?;
            }
            if !dangling.is_empty() {
                tracing::debug!(
                    component = "problem",
                    operation = "prune",
                    count = dangling.len(),
                    "Retracted dangling variables"
                );
            }
        }

        self.invalidate();
        Ok(removed)
    }

    /// Declared variables referenced by no constraint and not by the objective.
    fn dangling_variables(&self) -> Vec<String> {
        let mut live: BTreeSet<&str> = self.objective.variables();
        for entry in self.constraints.iter() {
            live.extend(entry.constraint.variables());
        }
        self.variables
            .iter()
            .map(Variable::name)
            .filter(|name| !live.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// Set the objective and its sense.
    pub fn set_objective(&mut self, sense: ObjectiveSense, objective: impl Into<Objective>) -> Result<()> {
        let objective = objective.into();
        let shape = match &objective {
            Objective::Affine(e) => e.shape,
            Objective::Quadratic(q) => q.affine.shape,
        };
        if !shape.is_scalar() {
            return Err(CanonError::shape("scalar objective", shape.to_string()));
        }
        for name in objective.variables() {
            self.variables.require(name)?;
        }
        self.sense = sense;
        self.objective = objective;
        Ok(())
    }

    pub fn minimize(&mut self, objective: impl Into<Objective>) -> Result<()> {
        self.set_objective(ObjectiveSense::Minimize, objective)
    }

    pub fn maximize(&mut self, objective: impl Into<Objective>) -> Result<()> {
        self.set_objective(ObjectiveSense::Maximize, objective)
    }

    /// Drop the objective; only feasibility matters.
    pub fn find(&mut self) {
        self.sense = ObjectiveSense::Find;
        self.objective = Objective::default();
    }

    /// Session of a backend, if one has been built since the last invalidation.
    pub fn session(&self, backend: Backend) -> Option<&BackendSession> {
        self.sessions.get(&backend)
    }

    /// Bring the backend's standard form up to date and return it.
    pub fn standard_form(&mut self, backend: Backend) -> Result<&StandardForm> {
        let policy = self.options.encoding_policy();
        let session = self
            .sessions
            .entry(backend)
            .or_insert_with(|| BackendSession::new(backend, policy));
        let result = session
            .rebuild(
                &mut self.variables,
                &mut self.constraints,
                &self.objective,
                self.sense,
            )
            .map(|_| ());
        if let Err(e) = result {
            self.invalidate();
            return Err(e);
        }
        self.sessions
            .get(&backend)
            .map(BackendSession::form)
            .ok_or_else(|| CanonError::Solver(format!("no session for {}", backend)))
    }

    /// Encode the whole problem ignoring every session.
    pub fn scratch_form(&self) -> Result<StandardForm> {
        StandardForm::build(
            &self.variables,
            &self.constraints,
            &self.objective,
            self.sense,
            self.options.encoding_policy(),
        )
    }

    /// Solve through a backend session with per-solve options.
    pub fn solve_with(&mut self, backend: Backend, options: &Options) -> Result<Solution> {
        match backend {
            Backend::Clarabel => {
                let form = self.standard_form(backend)?;
                solver::solve(form, options)
            }
            other => Err(CanonError::Unsupported(format!(
                "no solver adapter for {}",
                other
            ))),
        }
    }

    /// Solve with Clarabel and the problem's own options.
    pub fn solve(&mut self) -> Result<Solution> {
        let options = self.options.clone();
        self.solve_with(Backend::Clarabel, &options)
    }

    /// Drop every backend session and materialization tag.
    pub fn invalidate(&mut self) {
        self.sessions.clear();
        self.variables.clear_tags();
        self.constraints.clear_tags();
        tracing::debug!(
            component = "problem",
            operation = "invalidate",
            "Dropped all backend sessions"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintExt;

    #[test]
    fn test_add_constraint_unknown_variable() {
        let mut problem = Problem::new();
        let ghost = AffineExpr::zeros(Shape::scalar())
            .with_term("ghost", nalgebra_sparse::CscMatrix::identity(1))
            .unwrap();
        let c = ghost.leq(&AffineExpr::scalar(1.0)).unwrap();
        assert!(matches!(
            problem.add_constraint(c),
            Err(CanonError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_remove_variable_in_use() {
        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
        problem
            .add_constraint(x.sum().leq(&AffineExpr::scalar(1.0)).unwrap())
            .unwrap();
        assert!(matches!(
            problem.remove_variable("x"),
            Err(CanonError::InUse(_))
        ));
    }

    #[test]
    fn test_remove_constraint_prunes_dangling() {
        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
        let y = problem.add_variable(VariableBuilder::scalar("y")).unwrap();
        let h = problem
            .add_constraint(x.sum().leq(&AffineExpr::scalar(1.0)).unwrap())
            .unwrap();
        problem.minimize(y.clone()).unwrap();

        problem.remove_constraint(h).unwrap();
        assert!(problem.variable("x").is_none());
        assert_eq!(problem.variable("y").unwrap().start(), 0);
        assert_eq!(problem.variables().total_width(), 1);
    }

    #[test]
    fn test_remove_constraint_sweeps_unused_variables() {
        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::scalar("x")).unwrap();
        problem.add_variable(VariableBuilder::vector("spare", 3)).unwrap();
        let y = problem.add_variable(VariableBuilder::scalar("y")).unwrap();
        problem
            .add_constraint(x.geq(&AffineExpr::scalar(0.0)).unwrap())
            .unwrap();
        let h = problem
            .add_constraint(y.leq(&AffineExpr::scalar(1.0)).unwrap())
            .unwrap();

        problem.remove_constraint(h).unwrap();
        // spare was never referenced, y no longer is
        assert!(problem.variable("spare").is_none());
        assert!(problem.variable("y").is_none());
        assert_eq!(problem.variables().len(), 1);
        assert_eq!(problem.variable("x").unwrap().start(), 0);
    }

    #[test]
    fn test_quadratic_objective_must_be_scalar() {
        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
        let mut q = QuadExpr::sum_squares(&x);
        q.affine = x.clone();
        assert!(matches!(
            problem.minimize(q),
            Err(CanonError::ShapeError { .. })
        ));
        assert!(problem.scratch_form().is_ok());
    }

    #[test]
    fn test_remove_constraint_keeps_dangling_when_disabled() {
        let options = Options {
            prune_dangling: false,
            ..Options::default()
        };
        let mut problem = Problem::with_options(options);
        let x = problem.add_variable(VariableBuilder::scalar("x")).unwrap();
        let h = problem
            .add_constraint(x.geq(&AffineExpr::scalar(0.0)).unwrap())
            .unwrap();
        problem.remove_constraint(h).unwrap();
        assert!(problem.variable("x").is_some());
    }

    #[test]
    fn test_sessions_invalidated_on_removal() {
        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
        problem
            .add_constraint(x.geq(&AffineExpr::scalar(0.0)).unwrap())
            .unwrap();
        let h = problem
            .add_constraint(x.sum().leq(&AffineExpr::scalar(1.0)).unwrap())
            .unwrap();
        problem.standard_form(Backend::Mosek).unwrap();
        problem.standard_form(Backend::Gurobi).unwrap();
        assert!(problem.session(Backend::Mosek).is_some());
        assert!(problem.constraints().iter().all(|c| c.is_tagged(Backend::Gurobi)));

        problem.remove_constraint(h).unwrap();
        assert!(problem.session(Backend::Mosek).is_none());
        assert!(problem.session(Backend::Gurobi).is_none());
        assert!(problem.constraints().iter().all(|c| !c.is_tagged(Backend::Mosek)));
    }

    #[test]
    fn test_policy_change_invalidates() {
        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::scalar("x")).unwrap();
        problem
            .add_constraint(x.leq(&AffineExpr::scalar(3.0)).unwrap())
            .unwrap();
        assert_eq!(problem.standard_form(Backend::Cplex).unwrap().ineq.rows(), 1);

        problem.set_options(Options {
            bound_tightening: true,
            ..Options::default()
        });
        assert!(problem.session(Backend::Cplex).is_none());
        let form = problem.standard_form(Backend::Cplex).unwrap();
        assert_eq!(form.ineq.rows(), 0);
        assert_eq!(form.upper, vec![3.0]);
    }

    #[test]
    fn test_objective_must_be_scalar() {
        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
        assert!(matches!(
            problem.minimize(x),
            Err(CanonError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_solve_with_unsupported_backend() {
        let mut problem = Problem::new();
        assert!(matches!(
            problem.solve_with(Backend::Glpk, &Options::default()),
            Err(CanonError::Unsupported(_))
        ));
    }
}
