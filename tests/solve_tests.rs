//! End-to-end solves through Clarabel, including reformulated problems.

use cvxcanon::prelude::*;
use cvxcanon::reform::{dualize, quad_to_cone};
use nalgebra::DMatrix;

/// Tolerance for comparing optimal values
const TOL: f64 = 1e-5;

fn optimal_value(problem: &mut Problem) -> f64 {
    let solution = problem.solve().unwrap();
    assert_eq!(solution.status, SolveStatus::Optimal);
    solution.value.unwrap()
}

// ========== Test problems ==========

/// minimize x0 + 2 x1  s.t.  x0 + x1 = 1,  x >= 0; optimal value 1
fn small_lp() -> Problem {
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

/// minimize t  s.t.  ||x - (1, 2)|| <= t,  x = 0; optimal value sqrt(5)
fn distance_socp() -> Problem {
    let mut problem = Problem::new();
    let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
    let t = problem.add_variable(VariableBuilder::scalar("t")).unwrap();
    let shifted = x.sub(&AffineExpr::constant_vec(vec![1.0, 2.0])).unwrap();
    problem
        .add_constraint(Constraint::soc(shifted, t.clone()).unwrap())
        .unwrap();
    problem
        .add_constraint(x.equals(&AffineExpr::scalar(0.0)).unwrap())
        .unwrap();
    problem.minimize(t).unwrap();
    problem
}

// ========== Plain solves ==========

#[test]
fn test_lp_value_and_point() {
    let mut problem = small_lp();
    let solution = problem.solve().unwrap();
    assert_eq!(solution.status, SolveStatus::Optimal);
    assert!((solution.value.unwrap() - 1.0).abs() < TOL);
    let x = solution.slots(problem.variable("x").unwrap()).unwrap();
    assert!((x[0] - 1.0).abs() < 1e-4);
    assert!(x[1].abs() < 1e-4);
}

#[test]
fn test_maximize_reports_own_sense() {
    // maximize x0 + 2 x1  s.t.  x0 + x1 <= 1,  x >= 0
    let mut problem = Problem::new();
    let x = problem
        .add_variable(VariableBuilder::vector("x", 2).nonneg())
        .unwrap();
    problem
        .add_constraint(x.sum().leq(&AffineExpr::scalar(1.0)).unwrap())
        .unwrap();
    problem.maximize(x.dot(&[1.0, 2.0]).unwrap()).unwrap();
    assert!((optimal_value(&mut problem) - 2.0).abs() < TOL);
}

#[test]
fn test_socp_value() {
    let mut problem = distance_socp();
    assert!((optimal_value(&mut problem) - 5.0f64.sqrt()).abs() < TOL);
}

#[test]
fn test_infeasible_status() {
    let mut problem = Problem::new();
    let x = problem.add_variable(VariableBuilder::scalar("x")).unwrap();
    problem
        .add_constraint(x.geq(&AffineExpr::scalar(2.0)).unwrap())
        .unwrap();
    problem
        .add_constraint(x.leq(&AffineExpr::scalar(1.0)).unwrap())
        .unwrap();
    problem.minimize(x).unwrap();
    let solution = problem.solve().unwrap();
    assert_eq!(solution.status, SolveStatus::Infeasible);
    assert!(solution.value.is_none());
}

#[test]
fn test_find_only_checks_feasibility() {
    let mut problem = small_lp();
    problem.find();
    let solution = problem.solve().unwrap();
    assert_eq!(solution.status, SolveStatus::Optimal);
    let x = solution.slots(problem.variable("x").unwrap()).unwrap();
    assert!((x[0] + x[1] - 1.0).abs() < 1e-6);
}

#[test]
fn test_resolve_after_adding_constraint() {
    let mut problem = small_lp();
    assert!((optimal_value(&mut problem) - 1.0).abs() < TOL);

    let x = problem.var("x").unwrap();
    problem
        .add_constraint(x.entry(0, 0).unwrap().leq(&AffineExpr::scalar(0.25)).unwrap())
        .unwrap();
    // x = (0.25, 0.75): 0.25 + 1.5
    assert!((optimal_value(&mut problem) - 1.75).abs() < TOL);
    assert_eq!(problem.session(Backend::Clarabel).unwrap().builds(), 2);
}

#[test]
fn test_only_clarabel_has_an_adapter() {
    let mut problem = small_lp();
    let options = problem.options().clone();
    assert!(matches!(
        problem.solve_with(Backend::Scip, &options),
        Err(CanonError::Unsupported(_))
    ));
    assert!(problem.standard_form(Backend::Scip).is_ok());
}

// ========== Quadratic to cone ==========

#[test]
fn test_quadratic_objective_value_preserved() {
    // minimize x'Qx - x0 - x1 with Q = [2 1; 1 2]; optimum x = (1/6, 1/6), value -1/6
    let mut problem = Problem::new();
    problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
    let q = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
    let x = problem.var("x").unwrap();
    let objective = QuadExpr::quad_form(problem.variable("x").unwrap(), &q)
        .unwrap()
        .add_affine(&x.sum().neg())
        .unwrap();
    problem.minimize(objective).unwrap();

    let direct = optimal_value(&mut problem);
    assert!((direct + 1.0 / 6.0).abs() < TOL);

    let mut conic = quad_to_cone(&problem).unwrap();
    assert!(!conic.objective().is_quadratic());
    assert!((optimal_value(&mut conic) - direct).abs() < TOL);
}

#[test]
fn test_quadratic_constraint_needs_conversion() {
    // minimize x0 + x1  s.t.  x0^2 + x1^2 <= 1; value -sqrt(2)
    let mut problem = Problem::new();
    let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
    let ball = Constraint::quad_leq(
        QuadExpr::sum_squares(&x),
        QuadExpr::from_affine(AffineExpr::scalar(1.0)).unwrap(),
    )
    .unwrap();
    problem.add_keyed_constraint("ball", ball).unwrap();
    problem.minimize(x.sum()).unwrap();

    assert!(matches!(problem.solve(), Err(CanonError::Unsupported(_))));

    let mut conic = quad_to_cone(&problem).unwrap();
    assert!(conic.find_constraint("ball").is_ok());
    assert!((optimal_value(&mut conic) + 2.0f64.sqrt()).abs() < TOL);

    // The original columns keep their positions.
    let solution = conic.solve().unwrap();
    let x = solution.slots(conic.variable("x").unwrap()).unwrap();
    assert!((x[0] + 0.5f64.sqrt()).abs() < 1e-4);
}

#[test]
fn test_concave_maximize_converted() {
    // maximize -(x - 3)^2 = -x^2 + 6x - 9; value 0 at x = 3
    let mut problem = Problem::new();
    let x = problem.add_variable(VariableBuilder::scalar("x")).unwrap();
    let objective = QuadExpr::sum_squares(&x)
        .scale(-1.0)
        .add_affine(&x.scale(6.0).sub(&AffineExpr::scalar(9.0)).unwrap())
        .unwrap();
    problem.maximize(objective).unwrap();
    let mut conic = quad_to_cone(&problem).unwrap();
    assert!(optimal_value(&mut conic).abs() < TOL);
}

// ========== Duality ==========

#[test]
fn test_lp_dual_value() {
    let primal = small_lp();
    let mut dual = dualize(&primal).unwrap();
    assert!((optimal_value(&mut dual) - 1.0).abs() < TOL);
}

#[test]
fn test_lp_dual_of_dual_value() {
    let primal = small_lp();
    let dual = dualize(&primal).unwrap();
    let mut bidual = dualize(&dual).unwrap();
    assert!((optimal_value(&mut bidual) - 1.0).abs() < TOL);
}

#[test]
fn test_socp_dual_and_bidual() {
    let primal = distance_socp();
    let mut dual = dualize(&primal).unwrap();
    assert!((optimal_value(&mut dual) - 5.0f64.sqrt()).abs() < TOL);

    let mut bidual = dualize(&dual).unwrap();
    assert!((optimal_value(&mut bidual) - 5.0f64.sqrt()).abs() < TOL);
}

#[test]
fn test_dual_after_cone_conversion() {
    // minimize ||x||^2 - 2 x0  s.t.  x1 = 1; optimum x = (1, 1), value 0
    let mut problem = Problem::new();
    let x = problem.add_variable(VariableBuilder::vector("x", 2)).unwrap();
    problem
        .add_constraint(x.entry(1, 0).unwrap().equals(&AffineExpr::scalar(1.0)).unwrap())
        .unwrap();
    let objective = QuadExpr::sum_squares(&x)
        .add_affine(&x.entry(0, 0).unwrap().scale(-2.0))
        .unwrap();
    problem.minimize(objective).unwrap();

    assert!(matches!(dualize(&problem), Err(CanonError::Dualization(_))));
    let conic = quad_to_cone(&problem).unwrap();
    let mut dual = dualize(&conic).unwrap();
    assert!(optimal_value(&mut dual).abs() < TOL);
}
