//! Basic Linear Programming Example
//!
//! This example builds a small production-planning LP, prints its
//! standard form sizes and LP text, then solves it:
//!
//! maximize    c'x
//! subject to  Ax <= b, x >= 0

use cvxcanon::export::to_lp_string;
use cvxcanon::prelude::*;
use nalgebra::DMatrix;

fn main() -> Result<()> {
    println!("=== Basic Linear Program ===\n");

    // Problem: Maximize profit = 3*x1 + 2*x2 + 5*x3
    // subject to:
    //   2*x1 + x2 + 3*x3 <= 100  (resource constraint 1)
    //   x1 + 2*x2 + x3 <= 80     (resource constraint 2)
    //   x >= 0

    let mut problem = Problem::new();
    let x = problem.add_variable(VariableBuilder::vector("x", 3).nonneg())?;

    #[rustfmt::skip]
    let a = DMatrix::from_row_slice(2, 3, &[
        2.0, 1.0, 3.0,
        1.0, 2.0, 1.0,
    ]);
    let b = AffineExpr::constant_vec(vec![100.0, 80.0]);
    problem.add_keyed_constraint("resources", x.matmul_left(&a)?.leq(&b)?)?;
    problem.maximize(x.dot(&[3.0, 2.0, 5.0])?)?;

    let form = problem.standard_form(Backend::Clarabel)?;
    println!(
        "Standard form: {} columns, {} inequality rows, {} finite bounds\n",
        form.num_vars,
        form.ineq.rows(),
        form.finite_bounds()
    );
    println!("{}", to_lp_string(&problem)?);

    println!("Solving...");
    let solution = problem.solve()?;

    println!("\nResults:");
    println!("  Status: {:?}", solution.status);
    if let Some(value) = solution.value {
        println!("  Optimal profit: {:.4}", value);
    }
    if let Some(values) = problem.variable("x").and_then(|v| solution.slots(v)) {
        for (i, v) in values.iter().enumerate() {
            println!("  x{} = {:.4}", i + 1, v);
        }
    }
    Ok(())
}
