//! Text exports of the standard form.

mod cbf;
mod lp;
mod sdpa;

pub use cbf::to_cbf_string;
pub use lp::to_lp_string;
pub use sdpa::to_sdpa_string;

use std::path::Path;

use crate::error::{CanonError, Result};
use crate::problem::Problem;

/// Write `problem` to `path`, choosing the format from the extension:
/// `.lp` for CPLEX LP, `.dat-s` or `.sdpa` for SDPA sparse, `.cbf` for CBF.
pub fn write(problem: &Problem, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let text = if name.ends_with(".lp") {
        to_lp_string(problem)?
    } else if name.ends_with(".dat-s") || name.ends_with(".sdpa") {
        to_sdpa_string(problem)?
    } else if name.ends_with(".cbf") {
        to_cbf_string(problem)?
    } else {
        return Err(CanonError::Unsupported(format!(
            "no export format for {}",
            path.display()
        )));
    };
    std::fs::write(path, &text)?;
    tracing::debug!(
        component = "export",
        operation = "write",
        path = %path.display(),
        bytes = text.len(),
        "Exported problem"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cbf_extension_writes_file() {
        use crate::constraints::ConstraintExt;
        use crate::expr::{AffineExpr, VariableBuilder};

        let mut problem = Problem::new();
        let x = problem.add_variable(VariableBuilder::scalar("x")).unwrap();
        problem
            .add_constraint(x.geq(&AffineExpr::scalar(1.0)).unwrap())
            .unwrap();
        problem.minimize(x).unwrap();

        let path = std::env::temp_dir().join(format!("cvxcanon-{}.cbf", std::process::id()));
        write(&problem, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(text, to_cbf_string(&problem).unwrap());
        assert!(text.contains("CON\n1 1\nL+ 1\n"));
    }

    #[test]
    fn test_unknown_extension() {
        let problem = Problem::new();
        assert!(matches!(
            write(&problem, "model.mps"),
            Err(CanonError::Unsupported(_))
        ));
    }
}
