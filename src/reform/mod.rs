//! Problem reformulations that preserve the optimal value.

pub mod dual;
pub mod quad_cone;

pub use dual::dualize;
pub use quad_cone::quad_to_cone;
