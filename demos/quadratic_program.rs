//! Quadratic Programming Example
//!
//! This example solves a small QP directly, then again after rewriting the
//! quadratic objective as a rotated cone:
//!
//! minimize    ||x - target||^2
//! subject to  sum(x) = 4, x >= 0

use cvxcanon::prelude::*;
use cvxcanon::reform::quad_to_cone;

fn main() -> Result<()> {
    println!("=== Quadratic Programming ===\n");

    // Problem: Find point closest to [3, 2] satisfying x1 + x2 = 4, x >= 0
    println!("Problem: Find point closest to [3, 2]");
    println!("Subject to: x1 + x2 = 4, x >= 0\n");

    let mut problem = Problem::new();
    let x = problem.add_variable(VariableBuilder::vector("x", 2).nonneg())?;
    problem.add_constraint(x.sum().equals(&AffineExpr::scalar(4.0))?)?;
    let target = AffineExpr::constant_vec(vec![3.0, 2.0]);
    problem.minimize(QuadExpr::sum_squares(&x.sub(&target)?))?;

    let direct = problem.solve()?;
    println!("Direct QP:");
    println!("  Status: {:?}", direct.status);
    println!("  Optimal value: {:.6}", direct.value.unwrap_or(f64::NAN));

    let mut conic = quad_to_cone(&problem)?;
    let totals = conic.totals();
    println!(
        "\nCone form: {} variables, {} cone constraints",
        conic.variables().len(),
        totals.cone
    );
    let solution = conic.solve()?;
    println!("  Status: {:?}", solution.status);
    println!("  Optimal value: {:.6}", solution.value.unwrap_or(f64::NAN));
    if let Some(values) = conic.variable("x").and_then(|v| solution.slots(v)) {
        println!("  x = [{:.4}, {:.4}]", values[0], values[1]);
    }
    Ok(())
}
