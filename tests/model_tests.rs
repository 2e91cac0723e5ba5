//! Bookkeeping, canonicalization and incremental-build tests.

use cvxcanon::canon::canonicalize;
use cvxcanon::model::VariableTable;
use cvxcanon::prelude::*;
use nalgebra::DMatrix;
use proptest::prelude::*;

const TOL: f64 = 1e-9;

// ========== Concrete scenarios ==========

#[test]
fn test_vector_and_cone_counts() {
    // x in R^3, sum(x) <= 1, ||x|| <= t
    let mut problem = Problem::new();
    let x = problem.add_variable(VariableBuilder::vector("x", 3)).unwrap();
    let t = problem.add_variable(VariableBuilder::scalar("t")).unwrap();
    problem
        .add_constraint(x.sum().leq(&AffineExpr::scalar(1.0)).unwrap())
        .unwrap();
    problem.add_constraint(Constraint::soc(x, t).unwrap()).unwrap();

    let totals = problem.totals();
    assert_eq!(totals.count(ConstraintKind::Linear), 1);
    assert_eq!(totals.count(ConstraintKind::Cone), 1);
    assert_eq!(totals.cone_vars, 4);
    assert_eq!(problem.variables().total_width(), 4);
}

#[test]
fn test_symmetric_width_is_packed() {
    let mut problem = Problem::new();
    problem
        .add_variable(VariableBuilder::symmetric("X", 3))
        .unwrap();
    let x = problem.variable("X").unwrap();
    assert_eq!(x.width(), 6);
    assert_eq!(x.shape(), Shape::matrix(3, 3));
}

#[test]
fn test_removing_first_variable_shifts_second() {
    let mut problem = Problem::new();
    problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
    problem.add_variable(VariableBuilder::vector("y", 3)).unwrap();
    assert_eq!(problem.variable("y").unwrap().start(), 2);

    problem.remove_variable("x").unwrap();
    assert_eq!(problem.variable("y").unwrap().start(), 0);
    assert_eq!(problem.variables().total_width(), 3);
}

#[test]
fn test_semidefinite_counts() {
    let mut problem = Problem::new();
    let x = problem
        .add_variable(VariableBuilder::symmetric("X", 3))
        .unwrap();
    problem.add_constraint(Constraint::psd(x).unwrap()).unwrap();
    let totals = problem.totals();
    assert_eq!(totals.count(ConstraintKind::Semidefinite), 1);
    assert_eq!(totals.sdp_vars, 6);

    let form = problem.scratch_form().unwrap();
    assert_eq!(form.sdp.len(), 1);
    assert_eq!(form.sdp[0].side, 3);
    assert_eq!(form.sdp[0].block.rows(), 9);
}

#[test]
fn test_errors_surface_immediately() {
    let mut problem = Problem::new();
    problem.add_variable(VariableBuilder::scalar("t")).unwrap();
    assert!(matches!(
        problem.add_variable(VariableBuilder::scalar("t")),
        Err(CanonError::DuplicateName(_))
    ));
    assert!(matches!(
        problem.add_variable(VariableBuilder::new("S", Shape::matrix(2, 3)).kind(VarKind::Symmetric)),
        Err(CanonError::ShapeError { .. })
    ));
    assert!(matches!(
        problem.remove_variable("nope"),
        Err(CanonError::UnknownVariable(_))
    ));
    assert!(matches!(
        problem.find_constraint("nope"),
        Err(CanonError::UnknownConstraint(_))
    ));
}

// ========== Incremental builds ==========

fn growing_problem() -> Problem {
    let mut problem = Problem::new();
    let x = problem
        .add_variable(VariableBuilder::vector("x", 3).nonneg())
        .unwrap();
    let t = problem.add_variable(VariableBuilder::scalar("t")).unwrap();
    problem
        .add_constraint(x.sum().leq(&AffineExpr::scalar(1.0)).unwrap())
        .unwrap();
    problem
        .add_constraint(Constraint::soc(x.clone(), t.clone()).unwrap())
        .unwrap();
    problem.minimize(t.sub(&x.dot(&[1.0, 0.5, 0.25]).unwrap()).unwrap()).unwrap();
    problem
}

#[test]
fn test_incremental_matches_scratch() {
    let mut problem = growing_problem();
    problem.standard_form(Backend::Clarabel).unwrap();

    // New variable, new rows of two kinds, new objective.
    let y = problem
        .add_variable(VariableBuilder::vector("y", 2).upper(4.0))
        .unwrap();
    let x = problem.var("x").unwrap();
    problem
        .add_constraint(y.sum().equals(&x.entry(0, 0).unwrap()).unwrap())
        .unwrap();
    problem
        .add_group(
            vec![
                Constraint::geq(y.clone(), AffineExpr::scalar(-1.0)).unwrap().into(),
                Constraint::rotated(y.clone(), Some(x.entry(1, 0).unwrap()), None)
                    .unwrap()
                    .into(),
            ],
            Some("late"),
        )
        .unwrap();
    problem.minimize(y.sum()).unwrap();

    let incremental = problem.standard_form(Backend::Clarabel).unwrap().clone();
    let scratch = problem.scratch_form().unwrap();
    assert_eq!(incremental, scratch);
    assert_eq!(problem.session(Backend::Clarabel).unwrap().builds(), 2);
}

#[test]
fn test_incremental_matches_scratch_with_tightening() {
    let mut problem = growing_problem();
    let mut options = problem.options().clone();
    options.bound_tightening = true;
    problem.set_options(options);
    problem.standard_form(Backend::Mosek).unwrap();

    let x = problem.var("x").unwrap();
    problem
        .add_constraint(x.entry(2, 0).unwrap().leq(&AffineExpr::scalar(0.3)).unwrap())
        .unwrap();
    let incremental = problem.standard_form(Backend::Mosek).unwrap().clone();
    let scratch = problem.scratch_form().unwrap();
    assert_eq!(incremental, scratch);
    assert!((incremental.upper[2] - 0.3).abs() < TOL);
}

#[test]
fn test_sessions_are_independent() {
    let mut problem = growing_problem();
    problem.standard_form(Backend::Clarabel).unwrap();
    assert!(problem.session(Backend::Gurobi).is_none());
    problem.standard_form(Backend::Gurobi).unwrap();
    problem.standard_form(Backend::Gurobi).unwrap();
    assert_eq!(problem.session(Backend::Clarabel).unwrap().builds(), 1);
    assert_eq!(problem.session(Backend::Gurobi).unwrap().builds(), 2);
}

/// Rows as `(entries, rhs)` with `-0.0` folded into `0.0`, sorted so that
/// row order does not matter.
fn row_set(triplets: &[(usize, usize, f64)], rhs: &[f64]) -> Vec<(Vec<(usize, u64)>, u64)> {
    let mut rows: Vec<(Vec<(usize, u64)>, u64)> =
        rhs.iter().map(|b| (Vec::new(), (b + 0.0).to_bits())).collect();
    for &(r, c, v) in triplets {
        rows[r].0.push((c, (v + 0.0).to_bits()));
    }
    for row in &mut rows {
        row.0.sort();
    }
    rows.sort();
    rows
}

#[test]
fn test_remove_then_readd_matches_original() {
    // Flat(1) is the last constraint, so the rows come back in place.
    let mut problem = growing_problem();
    let original = problem.scratch_form().unwrap();
    problem.standard_form(Backend::Clarabel).unwrap();

    let removed = problem.remove_constraint(ConstraintIndex::Flat(1)).unwrap();
    assert!(problem.session(Backend::Clarabel).is_none());
    // x and t stay: the objective still refers to them.
    assert_eq!(problem.variables().len(), 2);

    problem.add_constraint(removed[0].clone()).unwrap();
    assert_eq!(problem.scratch_form().unwrap(), original);
    assert_eq!(problem.standard_form(Backend::Clarabel).unwrap(), &original);
}

#[test]
fn test_readd_middle_constraint_moves_its_rows_last() {
    let mut problem = Problem::new();
    let x = problem
        .add_variable(VariableBuilder::vector("x", 3))
        .unwrap();
    let t = problem.add_variable(VariableBuilder::scalar("t")).unwrap();
    problem
        .add_constraint(x.sum().leq(&AffineExpr::scalar(1.0)).unwrap())
        .unwrap();
    problem
        .add_constraint(x.geq(&AffineExpr::scalar(0.0)).unwrap())
        .unwrap();
    problem
        .add_constraint(t.leq(&AffineExpr::scalar(5.0)).unwrap())
        .unwrap();
    problem
        .add_constraint(Constraint::soc(x.clone(), t.clone()).unwrap())
        .unwrap();
    problem.minimize(t).unwrap();

    let original = problem.scratch_form().unwrap();
    assert_eq!(original.ineq.origin, vec![0, 1, 1, 1, 2]);

    let removed = problem.remove_constraint(ConstraintIndex::Flat(1)).unwrap();
    problem.add_constraint(removed[0].clone()).unwrap();
    let readded = problem.standard_form(Backend::Clarabel).unwrap().clone();

    // Same rows, with the re-added ones now last.
    assert_eq!(readded.ineq.origin, vec![0, 1, 3, 3, 3]);
    assert_ne!(readded.ineq.rhs, original.ineq.rhs);
    assert_eq!(
        row_set(&readded.ineq.triplets, &readded.ineq.rhs),
        row_set(&original.ineq.triplets, &original.ineq.rhs)
    );

    // Everything outside the moved rows is unchanged.
    assert_eq!(readded.eq, original.eq);
    assert_eq!(readded.objective, original.objective);
    assert_eq!((&readded.lower, &readded.upper), (&original.lower, &original.upper));
    let blocks = |f: &StandardForm| f.cones.iter().map(|c| c.block.clone()).collect::<Vec<_>>();
    assert_eq!(blocks(&readded), blocks(&original));

    assert_eq!(readded, problem.scratch_form().unwrap());
}

#[test]
fn test_remove_prunes_dangling_variables() {
    let mut problem = Problem::new();
    let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
    let z = problem.add_variable(VariableBuilder::scalar("z")).unwrap();
    problem
        .add_keyed_constraint("cap", z.leq(&AffineExpr::scalar(1.0)).unwrap())
        .unwrap();
    problem.minimize(x.sum()).unwrap();

    let key = problem.find_constraint("cap").unwrap();
    problem.remove_constraint(key).unwrap();
    assert!(problem.variable("z").is_none());
    assert_eq!(problem.variables().total_width(), 2);
}

// ========== Properties ==========

#[derive(Debug, Clone)]
enum TableOp {
    Declare(usize),
    Retract(usize),
}

fn table_op() -> impl Strategy<Value = TableOp> {
    prop_oneof![
        (1usize..5).prop_map(TableOp::Declare),
        (0usize..8).prop_map(TableOp::Retract),
    ]
}

fn small_coeff() -> impl Strategy<Value = f64> {
    -5.0f64..5.0
}

proptest! {
    #[test]
    fn live_ranges_partition_the_flat_space(ops in prop::collection::vec(table_op(), 1..40)) {
        let mut table = VariableTable::new();
        let mut next = 0;
        for op in ops {
            match op {
                TableOp::Declare(width) => {
                    table.declare(VariableBuilder::vector(format!("v{}", next), width)).unwrap();
                    next += 1;
                }
                TableOp::Retract(pick) => {
                    if !table.is_empty() {
                        let name = table.iter().nth(pick % table.len()).unwrap().name().to_string();
                        table.retract(&name).unwrap();
                    }
                }
            }
            let mut cursor = 0;
            for var in table.iter() {
                prop_assert_eq!(var.start(), cursor);
                prop_assert!(var.end() > var.start());
                cursor = var.end();
            }
            prop_assert_eq!(cursor, table.total_width());
        }
    }

    #[test]
    fn canonicalize_reproduces_evaluation(
        lx in prop::collection::vec(small_coeff(), 6),
        ly in prop::collection::vec(small_coeff(), 8),
        c in prop::collection::vec(small_coeff(), 2),
        point in prop::collection::vec(small_coeff(), 6),
    ) {
        let mut table = VariableTable::new();
        table.declare(VariableBuilder::vector("x", 3)).unwrap();
        table.declare(VariableBuilder::symmetric("Y", 2)).unwrap();
        let x = AffineExpr::variable(table.get("x").unwrap());
        let y = AffineExpr::variable(table.get("Y").unwrap());

        let expr = x
            .linear_map(&DMatrix::from_row_slice(2, 3, &lx), Shape::vector(2))
            .unwrap()
            .add(&y.linear_map(&DMatrix::from_row_slice(2, 4, &ly), Shape::vector(2)).unwrap())
            .unwrap()
            .add(&AffineExpr::constant_vec(c))
            .unwrap();

        let gh = canonicalize(&expr, &table).unwrap();
        let expected = expr.evaluate(&table, &point).unwrap();
        let got = gh.evaluate(&point);
        prop_assert_eq!(got.len(), expected.len());
        for (a, b) in got.iter().zip(expected.as_slice()) {
            prop_assert!((a - b).abs() < 1e-9);
        }
    }
}
