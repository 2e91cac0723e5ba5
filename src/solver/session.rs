//! Per-backend incremental encoding state.

use std::fmt;
use std::str::FromStr;

use super::standard_form::StandardForm;
use crate::config::EncodingPolicy;
use crate::constraints::ConstraintStore;
use crate::error::{CanonError, Result};
use crate::model::VariableTable;
use crate::problem::{Objective, ObjectiveSense};

/// Identity of a consumer of the standard form.
///
/// Each backend owns an independent session and its own set of
/// materialization tags on variables and constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Backend {
    Clarabel,
    Cvxopt,
    Mosek,
    Gurobi,
    Cplex,
    Glpk,
    Scip,
}

impl Backend {
    pub const ALL: [Backend; 7] = [
        Backend::Clarabel,
        Backend::Cvxopt,
        Backend::Mosek,
        Backend::Gurobi,
        Backend::Cplex,
        Backend::Glpk,
        Backend::Scip,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Clarabel => "clarabel",
            Backend::Cvxopt => "cvxopt",
            Backend::Mosek => "mosek",
            Backend::Gurobi => "gurobi",
            Backend::Cplex => "cplex",
            Backend::Glpk => "glpk",
            Backend::Scip => "scip",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = CanonError;

    fn from_str(s: &str) -> Result<Self> {
        Backend::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CanonError::InvalidOption(format!("unknown backend '{}'", s)))
    }
}

/// The standard form a backend has materialized so far.
#[derive(Debug, Clone)]
pub struct BackendSession {
    backend: Backend,
    policy: EncodingPolicy,
    form: StandardForm,
    builds: usize,
}

impl BackendSession {
    pub fn new(backend: Backend, policy: EncodingPolicy) -> Self {
        BackendSession {
            backend,
            policy,
            form: StandardForm::default(),
            builds: 0,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn policy(&self) -> EncodingPolicy {
        self.policy
    }

    pub fn form(&self) -> &StandardForm {
        &self.form
    }

    /// Number of rebuilds since the session was created.
    pub fn builds(&self) -> usize {
        self.builds
    }

    /// Encode every entry not yet tagged with this backend, then tag it.
    pub(crate) fn rebuild(
        &mut self,
        table: &mut VariableTable,
        store: &mut ConstraintStore,
        objective: &Objective,
        sense: ObjectiveSense,
    ) -> Result<&StandardForm> {
        let backend = self.backend;
        let encoded = self.form.extend(
            table,
            store,
            objective,
            sense,
            self.policy,
            |entry| !entry.is_tagged(backend),
        )?;
        for &index in &encoded {
            store.tag(index, backend);
        }
        let fresh: Vec<usize> = table
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_tagged(backend))
            .map(|(pos, _)| pos)
            .collect();
        for &pos in &fresh {
            table.tag(pos, backend);
        }
        self.builds += 1;

        tracing::debug!(
            component = "session",
            operation = "rebuild",
            backend = %backend,
            constraints = encoded.len(),
            variables = fresh.len(),
            build = self.builds,
            "Rebuilt standard form"
        );
        Ok(&self.form)
    }
}
